//! Relay configuration: time bounds and the candidate table.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_core::{ConfigValidation, TetherError};

use crate::candidate::{CandidateTable, RelayCandidate};

/// Hard time bounds for one acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayTimeouts {
    /// Allocation handshake bound
    pub handshake_ms: u64,
    /// Bound on resolving the client and relayed endpoints after the handshake
    pub endpoint_resolution_ms: u64,
    /// Peer whitelisting bound
    pub whitelist_ms: u64,
}

impl Default for RelayTimeouts {
    fn default() -> Self {
        Self {
            handshake_ms: 10_000,
            endpoint_resolution_ms: 10_000,
            whitelist_ms: 6_000,
        }
    }
}

impl RelayTimeouts {
    /// Bound on the allocation handshake
    pub fn handshake(&self) -> Duration {
        Duration::from_millis(self.handshake_ms)
    }

    /// Bound on resolving both endpoints
    pub fn endpoint_resolution(&self) -> Duration {
        Duration::from_millis(self.endpoint_resolution_ms)
    }

    /// Bound on whitelisting a peer
    pub fn whitelist(&self) -> Duration {
        Duration::from_millis(self.whitelist_ms)
    }

    /// Upper bound on trying `attempts` candidates one after another
    pub fn worst_case(&self, attempts: usize) -> Duration {
        let per_attempt = self.handshake() + self.endpoint_resolution() + self.whitelist();
        per_attempt * u32::try_from(attempts).unwrap_or(u32::MAX)
    }
}

impl ConfigValidation for RelayTimeouts {
    fn validate(&self) -> Result<(), TetherError> {
        for (name, value) in [
            ("handshake_ms", self.handshake_ms),
            ("endpoint_resolution_ms", self.endpoint_resolution_ms),
            ("whitelist_ms", self.whitelist_ms),
        ] {
            if value == 0 {
                return Err(TetherError::config(format!("relay.timeouts.{name} must be non-zero")));
            }
        }
        Ok(())
    }
}

/// `[relay]` section of the node configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Per-step acquisition bounds
    #[serde(default)]
    pub timeouts: RelayTimeouts,
    /// Relay servers, keyed by their `id`
    #[serde(default)]
    pub candidates: Vec<RelayCandidate>,
}

impl RelayConfig {
    /// Build the read-only candidate table
    pub fn table(&self) -> Result<CandidateTable, TetherError> {
        CandidateTable::new(self.candidates.iter().cloned())
    }
}

impl ConfigValidation for RelayConfig {
    fn validate(&self) -> Result<(), TetherError> {
        self.timeouts.validate()?;
        self.table().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::AddressFamily;
    use tether_core::config::load_toml_str;

    const SAMPLE: &str = r#"
        [timeouts]
        whitelist_ms = 4000

        [[candidates]]
        id = 0
        ipv4 = { host = "relay.example.net", port = 3478 }
        ipv6 = { host = "relay.example.net", port = 3478 }
        realm = "example.net"

        [[candidates]]
        id = 1
        ipv4 = { host = "turn.example.org", port = 443 }
        credentials = { username = "steve", password = "secret" }
    "#;

    #[test]
    fn parses_candidates_and_partial_timeouts() {
        let config: RelayConfig = load_toml_str(SAMPLE).unwrap();
        assert_eq!(config.timeouts.handshake_ms, 10_000);
        assert_eq!(config.timeouts.whitelist_ms, 4_000);

        let table = config.table().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.supporting(AddressFamily::V6), vec![0]);
        let second = table.get(1).unwrap();
        assert_eq!(second.credentials.as_ref().unwrap().username, "steve");
        assert!(second.realm.is_none());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = load_toml_str::<RelayConfig>("[timeouts]\nhandshake_ms = 0").unwrap_err();
        assert!(err.to_string().contains("handshake_ms"));
    }

    #[test]
    fn worst_case_scales_with_attempts() {
        let timeouts = RelayTimeouts::default();
        assert_eq!(timeouts.worst_case(0), Duration::ZERO);
        assert_eq!(timeouts.worst_case(2), Duration::from_secs(52));
    }
}
