//! Relay protocol client boundary
//!
//! The relay wire protocol (TURN allocation, refreshes, permissions) lives
//! outside this crate. The manager only needs a client it can start, query
//! for the two resolved endpoints, ask to whitelist a peer, and close.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::candidate::{AddressFamily, RelayCredentials, RelayEndpoint};
use crate::error::RelayError;

/// Local network interface a relay client binds to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalInterface {
    /// OS interface name (e.g. `eth0`)
    pub name: String,
    /// Position of the interface in the node's interface list
    pub index: usize,
}

impl LocalInterface {
    /// Interface `name` at position `index`
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

/// Datagram received through a relay allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayDatagram {
    /// Sender as seen by the relay
    pub from: SocketAddr,
    /// Datagram body
    pub payload: Vec<u8>,
}

/// Where a relay client delivers inbound datagrams
pub type InboundSender = mpsc::UnboundedSender<RelayDatagram>;

/// Everything needed to open a relay protocol client
#[derive(Debug, Clone)]
pub struct RelayClientParams {
    /// Family to allocate on
    pub af: AddressFamily,
    /// Relay server for that family
    pub server: RelayEndpoint,
    /// Interface the client binds to
    pub interface: LocalInterface,
    /// Credentials for the handshake
    pub credentials: Option<RelayCredentials>,
    /// Authentication realm
    pub realm: Option<String>,
    /// Sink for relayed datagrams; dropped when `None`
    pub inbound: Option<InboundSender>,
}

/// A running relay protocol client
#[async_trait]
pub trait RelayProtocolClient: Send + Sync {
    /// Perform the allocation handshake
    async fn start(&self) -> Result<(), RelayError>;

    /// Our public (server-reflexive) endpoint as seen by the relay.
    ///
    /// Resolves once the protocol layer has learned it.
    async fn client_endpoint(&self) -> Result<SocketAddr, RelayError>;

    /// The relayed endpoint allocated for us.
    ///
    /// Resolves independently of [`client_endpoint`](Self::client_endpoint).
    async fn relay_endpoint(&self) -> Result<SocketAddr, RelayError>;

    /// Whitelist a peer so its traffic is forwarded to us.
    ///
    /// Returns `true` if the peer was already accepted.
    async fn accept_peer(&self, peer: SocketAddr, peer_relay: SocketAddr)
        -> Result<bool, RelayError>;

    /// Release the allocation and local socket
    async fn close(&self) -> Result<(), RelayError>;
}

/// Opens relay protocol clients
#[async_trait]
pub trait RelayConnector: Send + Sync {
    /// Create a client for `params`. No network exchange happens until
    /// [`RelayProtocolClient::start`].
    async fn open(
        &self,
        params: RelayClientParams,
    ) -> Result<Arc<dyn RelayProtocolClient>, RelayError>;
}
