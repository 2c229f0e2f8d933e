//! Relay client acquisition
//!
//! [`RelayClientManager::acquire`] brings up one relay session against one
//! candidate under hard time bounds and never retries on its own.
//! [`RelayClientManager::acquire_first_working`] is the fallback layer: it
//! walks a candidate list in order and keeps the first session that works.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::candidate::{AddressFamily, CandidateTable};
use crate::client::{InboundSender, LocalInterface, RelayClientParams, RelayConnector, RelayProtocolClient};
use crate::config::RelayTimeouts;
use crate::error::RelayError;
use crate::session::RelaySession;

/// A peer to whitelist on the new allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddresses {
    /// The peer's public endpoint
    pub peer: SocketAddr,
    /// The peer's own relayed endpoint
    pub peer_relay: SocketAddr,
}

/// Parameters for a single acquisition attempt
#[derive(Debug, Clone)]
pub struct AcquireRequest {
    /// Address family of the allocation
    pub af: AddressFamily,
    /// Candidate to use, looked up in the table
    pub candidate_id: u32,
    /// Local interface the client binds to
    pub interface: LocalInterface,
    /// Peer to whitelist after the endpoints resolve
    pub peer: Option<PeerAddresses>,
    /// Sink for datagrams arriving through the relay
    pub inbound: Option<InboundSender>,
}

impl AcquireRequest {
    /// Request with no peer and no inbound sink
    pub fn new(af: AddressFamily, candidate_id: u32, interface: LocalInterface) -> Self {
        Self {
            af,
            candidate_id,
            interface,
            peer: None,
            inbound: None,
        }
    }

    /// Whitelist `peer` (reachable via `peer_relay`) once the session is up
    pub fn with_peer(mut self, peer: SocketAddr, peer_relay: SocketAddr) -> Self {
        self.peer = Some(PeerAddresses { peer, peer_relay });
        self
    }

    /// Deliver datagrams arriving through the relay to `inbound`
    pub fn with_inbound(mut self, inbound: Option<InboundSender>) -> Self {
        self.inbound = inbound;
        self
    }
}

/// Acquires relay sessions from a fixed candidate table
pub struct RelayClientManager {
    table: Arc<CandidateTable>,
    connector: Arc<dyn RelayConnector>,
    timeouts: RelayTimeouts,
}

impl RelayClientManager {
    /// Manager over `table`, opening clients through `connector`
    pub fn new(
        table: Arc<CandidateTable>,
        connector: Arc<dyn RelayConnector>,
        timeouts: RelayTimeouts,
    ) -> Self {
        Self {
            table,
            connector,
            timeouts,
        }
    }

    /// The candidate table
    pub fn table(&self) -> &CandidateTable {
        &self.table
    }

    /// Per-step bounds used by [`acquire`](Self::acquire)
    pub fn timeouts(&self) -> RelayTimeouts {
        self.timeouts
    }

    /// Bring up a relay session on one candidate.
    ///
    /// Fails with [`RelayError::UnsupportedAddressFamily`] before any I/O if
    /// the candidate has no endpoint for the family. The handshake, the
    /// endpoint resolution and the optional peer whitelist each run under
    /// their own bound. If a step fails after the client was opened the
    /// client is closed before the error is returned.
    pub async fn acquire(&self, request: AcquireRequest) -> Result<RelaySession, RelayError> {
        let AcquireRequest {
            af,
            candidate_id,
            interface,
            peer,
            inbound,
        } = request;

        let candidate = self.table.get(candidate_id).ok_or(RelayError::UnknownCandidate {
            candidate: candidate_id,
        })?;
        let server = candidate
            .endpoint(af)
            .cloned()
            .ok_or(RelayError::UnsupportedAddressFamily {
                candidate: candidate_id,
                af,
            })?;

        debug!(candidate = candidate_id, %server, %af, interface = %interface.name, "opening relay client");
        let client = self
            .connector
            .open(RelayClientParams {
                af,
                server,
                interface,
                credentials: candidate.credentials.clone(),
                realm: candidate.realm.clone(),
                inbound,
            })
            .await?;

        match self.establish(candidate_id, client.as_ref(), peer).await {
            Ok((client_endpoint, relay_endpoint)) => {
                info!(
                    candidate = candidate_id,
                    %client_endpoint,
                    %relay_endpoint,
                    "relay session established"
                );
                Ok(RelaySession::new(
                    candidate_id,
                    af,
                    client_endpoint,
                    relay_endpoint,
                    client,
                ))
            }
            Err(error) => {
                if let Err(close_error) = client.close().await {
                    debug!(candidate = candidate_id, error = %close_error, "closing failed relay client");
                }
                Err(error)
            }
        }
    }

    async fn establish(
        &self,
        candidate: u32,
        client: &dyn RelayProtocolClient,
        peer: Option<PeerAddresses>,
    ) -> Result<(SocketAddr, SocketAddr), RelayError> {
        let handshake = self.timeouts.handshake();
        tokio::time::timeout(handshake, client.start())
            .await
            .map_err(|_| RelayError::HandshakeTimeout {
                candidate,
                after: handshake,
            })??;

        let resolution = self.timeouts.endpoint_resolution();
        let (client_endpoint, relay_endpoint) = tokio::time::timeout(resolution, async {
            futures::try_join!(client.client_endpoint(), client.relay_endpoint())
        })
        .await
        .map_err(|_| RelayError::EndpointResolutionTimeout {
            candidate,
            after: resolution,
        })??;

        if let Some(PeerAddresses { peer, peer_relay }) = peer {
            let whitelist = self.timeouts.whitelist();
            tokio::time::timeout(whitelist, client.accept_peer(peer, peer_relay))
                .await
                .map_err(|_| RelayError::PeerWhitelistTimeout {
                    candidate,
                    after: whitelist,
                })??;
            debug!(candidate, %peer, %peer_relay, "peer whitelisted");
        }

        Ok((client_endpoint, relay_endpoint))
    }

    /// Whitelist a peer on an existing session under the whitelist bound.
    ///
    /// Returns `true` if the relay already accepted this peer.
    pub async fn whitelist_peer(
        &self,
        session: &RelaySession,
        peer: SocketAddr,
        peer_relay: SocketAddr,
    ) -> Result<bool, RelayError> {
        let whitelist = self.timeouts.whitelist();
        tokio::time::timeout(whitelist, session.client().accept_peer(peer, peer_relay))
            .await
            .map_err(|_| RelayError::PeerWhitelistTimeout {
                candidate: session.candidate_id(),
                after: whitelist,
            })?
    }

    /// Try candidates in order; the first working session wins.
    ///
    /// Each failure is logged and the next candidate tried. Returns `None`
    /// once every candidate has failed.
    pub async fn acquire_first_working(
        &self,
        af: AddressFamily,
        candidate_ids: &[u32],
        interface: &LocalInterface,
        inbound: Option<InboundSender>,
    ) -> Option<RelaySession> {
        self.try_acquire_first_working(af, candidate_ids, interface, inbound)
            .await
            .ok()
    }

    /// Like [`acquire_first_working`](Self::acquire_first_working) but
    /// reports total failure as [`RelayError::AllCandidatesFailed`].
    pub async fn try_acquire_first_working(
        &self,
        af: AddressFamily,
        candidate_ids: &[u32],
        interface: &LocalInterface,
        inbound: Option<InboundSender>,
    ) -> Result<RelaySession, RelayError> {
        for &candidate_id in candidate_ids {
            let request = AcquireRequest::new(af, candidate_id, interface.clone())
                .with_inbound(inbound.clone());
            match self.acquire(request).await {
                Ok(session) => {
                    info!(candidate = candidate_id, "using relay candidate");
                    return Ok(session);
                }
                Err(error) => {
                    warn!(candidate = candidate_id, error = %error, "relay candidate failed, trying next");
                }
            }
        }

        warn!(attempted = candidate_ids.len(), "no working relay candidate");
        Err(RelayError::AllCandidatesFailed {
            attempted: candidate_ids.len(),
        })
    }
}
