//! Acquired relay sessions

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tether_core::{Closable, TetherError};
use tracing::debug;

use crate::candidate::AddressFamily;
use crate::client::RelayProtocolClient;
use crate::error::RelayError;

/// A relay allocation that completed its handshake
pub struct RelaySession {
    candidate_id: u32,
    af: AddressFamily,
    client_endpoint: SocketAddr,
    relay_endpoint: SocketAddr,
    client: Arc<dyn RelayProtocolClient>,
    closed: AtomicBool,
}

impl RelaySession {
    pub(crate) fn new(
        candidate_id: u32,
        af: AddressFamily,
        client_endpoint: SocketAddr,
        relay_endpoint: SocketAddr,
        client: Arc<dyn RelayProtocolClient>,
    ) -> Self {
        Self {
            candidate_id,
            af,
            client_endpoint,
            relay_endpoint,
            client,
            closed: AtomicBool::new(false),
        }
    }

    /// Id of the candidate relay serving this session
    pub fn candidate_id(&self) -> u32 {
        self.candidate_id
    }

    /// Family the allocation was made on
    pub fn af(&self) -> AddressFamily {
        self.af
    }

    /// Our public endpoint as reported by the relay
    pub fn client_endpoint(&self) -> SocketAddr {
        self.client_endpoint
    }

    /// The relayed endpoint peers send to
    pub fn relay_endpoint(&self) -> SocketAddr {
        self.relay_endpoint
    }

    /// Underlying protocol client
    pub fn client(&self) -> &Arc<dyn RelayProtocolClient> {
        &self.client
    }

    /// Whether [`shutdown`](Self::shutdown) has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the protocol client. Only the first call reaches the client.
    pub async fn shutdown(&self) -> Result<(), RelayError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!(candidate = self.candidate_id, "relay session already closed");
            return Ok(());
        }
        self.client.close().await
    }
}

impl fmt::Debug for RelaySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelaySession")
            .field("candidate_id", &self.candidate_id)
            .field("af", &self.af)
            .field("client_endpoint", &self.client_endpoint)
            .field("relay_endpoint", &self.relay_endpoint)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Closable for RelaySession {
    async fn close(&self) -> Result<(), TetherError> {
        self.shutdown().await.map_err(Into::into)
    }

    fn label(&self) -> String {
        format!("relay:{}", self.candidate_id)
    }
}
