//! Candidate relay servers
//!
//! The candidate table is read-only configuration built once at startup.
//! Each entry carries an optional endpoint per address family, credentials
//! and a realm.

use std::collections::BTreeMap;
use std::fmt;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tether_core::{ConfigValidation, TetherError};

/// IP address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    /// IPv4
    V4,
    /// IPv6
    V6,
}

impl AddressFamily {
    /// Family of a concrete socket address
    pub fn of(addr: &std::net::SocketAddr) -> Self {
        if addr.is_ipv4() {
            Self::V4
        } else {
            Self::V6
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => f.write_str("IPv4"),
            Self::V6 => f.write_str("IPv6"),
        }
    }
}

/// Host and port of a relay server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelayEndpoint {
    /// Host name or address literal
    pub host: String,
    /// UDP port
    pub port: u16,
}

impl RelayEndpoint {
    /// Endpoint for `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for RelayEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Long-term relay credentials
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayCredentials {
    /// Account name
    pub username: String,
    /// Never printed by `Debug`
    pub password: String,
}

impl fmt::Debug for RelayCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One configured relay server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayCandidate {
    /// Stable identifier, also exchanged with peers in signaling messages
    pub id: u32,
    /// Endpoint used over IPv4, or `None` if the server has no IPv4 service
    #[serde(default)]
    pub ipv4: Option<RelayEndpoint>,
    /// Endpoint used over IPv6, or `None` if the server has no IPv6 service
    #[serde(default)]
    pub ipv6: Option<RelayEndpoint>,
    /// Credentials presented during the handshake, if the server wants any
    #[serde(default)]
    pub credentials: Option<RelayCredentials>,
    /// Authentication realm
    #[serde(default)]
    pub realm: Option<String>,
}

impl RelayCandidate {
    /// Endpoint for `af`, or `None` when the family is unsupported
    pub fn endpoint(&self, af: AddressFamily) -> Option<&RelayEndpoint> {
        match af {
            AddressFamily::V4 => self.ipv4.as_ref(),
            AddressFamily::V6 => self.ipv6.as_ref(),
        }
    }

    /// Whether the candidate serves `af`
    pub fn supports(&self, af: AddressFamily) -> bool {
        self.endpoint(af).is_some()
    }
}

impl ConfigValidation for RelayCandidate {
    fn validate(&self) -> Result<(), TetherError> {
        if self.ipv4.is_none() && self.ipv6.is_none() {
            return Err(TetherError::config(format!(
                "relay candidate {} supports no address family",
                self.id
            )));
        }
        for endpoint in self.ipv4.iter().chain(self.ipv6.iter()) {
            if endpoint.host.trim().is_empty() || endpoint.port == 0 {
                return Err(TetherError::config(format!(
                    "relay candidate {} has invalid endpoint {endpoint}",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

/// Candidate relay servers indexed by id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateTable {
    candidates: BTreeMap<u32, RelayCandidate>,
}

impl CandidateTable {
    /// Build a table, rejecting duplicate ids and invalid entries
    pub fn new(candidates: impl IntoIterator<Item = RelayCandidate>) -> Result<Self, TetherError> {
        let mut table = BTreeMap::new();
        for candidate in candidates {
            candidate.validate()?;
            let id = candidate.id;
            if table.insert(id, candidate).is_some() {
                return Err(TetherError::config(format!(
                    "duplicate relay candidate id {id}"
                )));
            }
        }
        Ok(Self { candidates: table })
    }

    /// Candidate with the given id
    pub fn get(&self, id: u32) -> Option<&RelayCandidate> {
        self.candidates.get(&id)
    }

    /// Number of candidates
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether the table has no candidates
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// All ids in ascending order
    pub fn ids(&self) -> Vec<u32> {
        self.candidates.keys().copied().collect()
    }

    /// Ids of candidates with an endpoint for `af`, ascending
    pub fn supporting(&self, af: AddressFamily) -> Vec<u32> {
        self.candidates
            .values()
            .filter(|candidate| candidate.supports(af))
            .map(|candidate| candidate.id)
            .collect()
    }

    /// Ids supporting `af` in random order, spreading load across relays
    pub fn shuffled_ids(&self, af: AddressFamily) -> Vec<u32> {
        let mut ids = self.supporting(af);
        ids.shuffle(&mut rand::thread_rng());
        ids
    }
}
