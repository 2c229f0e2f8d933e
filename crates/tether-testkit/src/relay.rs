//! Scripted relay protocol doubles and candidate fixtures

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tether_relay::{
    AddressFamily, CandidateTable, LocalInterface, RelayCandidate, RelayClientParams,
    RelayConnector, RelayCredentials, RelayEndpoint, RelayError, RelayProtocolClient,
};

use crate::log::CallLog;

/// How a scripted relay server behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayBehavior {
    Healthy,
    /// The handshake never completes
    StallHandshake,
    /// The handshake is rejected
    FailHandshake,
    /// The relayed endpoint is never reported
    StallEndpoints,
    /// Peer whitelisting never completes
    StallWhitelist,
    /// Healthy, but closing the client fails
    FailClose,
    /// The handshake completes after the given delay
    DelayHandshake(Duration),
}

/// Relay client following a [`RelayBehavior`].
///
/// Logs `open:<host>`, `start:<host>`, `accept:<host>` and `close:<host>`.
#[derive(Debug)]
pub struct ScriptedRelayClient {
    host: String,
    behavior: RelayBehavior,
    log: CallLog,
    client_endpoint: SocketAddr,
    relay_endpoint: SocketAddr,
}

#[async_trait]
impl RelayProtocolClient for ScriptedRelayClient {
    async fn start(&self) -> Result<(), RelayError> {
        self.log.record(format!("start:{}", self.host));
        match self.behavior {
            RelayBehavior::StallHandshake => futures::future::pending().await,
            RelayBehavior::FailHandshake => Err(RelayError::protocol(format!(
                "{} rejected the allocation",
                self.host
            ))),
            RelayBehavior::DelayHandshake(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn client_endpoint(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.client_endpoint)
    }

    async fn relay_endpoint(&self) -> Result<SocketAddr, RelayError> {
        if self.behavior == RelayBehavior::StallEndpoints {
            futures::future::pending::<()>().await;
        }
        Ok(self.relay_endpoint)
    }

    async fn accept_peer(
        &self,
        _peer: SocketAddr,
        _peer_relay: SocketAddr,
    ) -> Result<bool, RelayError> {
        self.log.record(format!("accept:{}", self.host));
        if self.behavior == RelayBehavior::StallWhitelist {
            futures::future::pending::<()>().await;
        }
        Ok(false)
    }

    async fn close(&self) -> Result<(), RelayError> {
        self.log.record(format!("close:{}", self.host));
        if self.behavior == RelayBehavior::FailClose {
            return Err(RelayError::protocol(format!("{} close failed", self.host)));
        }
        Ok(())
    }
}

/// Connector handing out [`ScriptedRelayClient`]s by server host.
///
/// Hosts without a scripted behavior are healthy.
#[derive(Debug, Default)]
pub struct ScriptedConnector {
    behaviors: Mutex<HashMap<String, RelayBehavior>>,
    log: CallLog,
    next_port: AtomicU16,
}

impl ScriptedConnector {
    pub fn new(log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            behaviors: Mutex::new(HashMap::new()),
            log: log.clone(),
            next_port: AtomicU16::new(0),
        })
    }

    /// Script the server at `host`
    pub fn script(&self, host: impl Into<String>, behavior: RelayBehavior) {
        self.behaviors.lock().insert(host.into(), behavior);
    }

    /// Hosts opened so far, in order
    pub fn opened(&self) -> Vec<String> {
        self.log
            .with_prefix("open:")
            .into_iter()
            .map(|entry| entry.trim_start_matches("open:").to_string())
            .collect()
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }
}

#[async_trait]
impl RelayConnector for ScriptedConnector {
    async fn open(
        &self,
        params: RelayClientParams,
    ) -> Result<Arc<dyn RelayProtocolClient>, RelayError> {
        let host = params.server.host.clone();
        self.log.record(format!("open:{host}"));

        let behavior = self
            .behaviors
            .lock()
            .get(&host)
            .copied()
            .unwrap_or(RelayBehavior::Healthy);
        let offset = self.next_port.fetch_add(1, Ordering::SeqCst);
        let (public_ip, relay_ip): (IpAddr, IpAddr) = match params.af {
            AddressFamily::V4 => (
                Ipv4Addr::new(198, 51, 100, 7).into(),
                Ipv4Addr::new(203, 0, 113, 9).into(),
            ),
            AddressFamily::V6 => (
                Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 7).into(),
                Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 9).into(),
            ),
        };

        Ok(Arc::new(ScriptedRelayClient {
            host,
            behavior,
            log: self.log.clone(),
            client_endpoint: SocketAddr::new(public_ip, 40_000 + offset),
            relay_endpoint: SocketAddr::new(relay_ip, 50_000 + offset),
        }))
    }
}

/// IPv4-only candidate served by `host:3478`
pub fn candidate(id: u32, host: &str) -> RelayCandidate {
    RelayCandidate {
        id,
        ipv4: Some(RelayEndpoint::new(host, 3478)),
        ipv6: None,
        credentials: Some(RelayCredentials {
            username: "tether".to_string(),
            password: "tether".to_string(),
        }),
        realm: Some("tether.test".to_string()),
    }
}

/// IPv6-only candidate served by `host:3478`
pub fn v6_only_candidate(id: u32, host: &str) -> RelayCandidate {
    RelayCandidate {
        ipv4: None,
        ipv6: Some(RelayEndpoint::new(host, 3478)),
        ..candidate(id, host)
    }
}

/// Candidate with both families on `host:3478`
pub fn dual_stack_candidate(id: u32, host: &str) -> RelayCandidate {
    RelayCandidate {
        ipv6: Some(RelayEndpoint::new(host, 3478)),
        ..candidate(id, host)
    }
}

pub fn table(candidates: impl IntoIterator<Item = RelayCandidate>) -> Arc<CandidateTable> {
    Arc::new(CandidateTable::new(candidates).expect("valid candidate table"))
}

pub fn interface() -> LocalInterface {
    LocalInterface::new("eth0", 0)
}
