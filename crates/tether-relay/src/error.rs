//! Relay acquisition errors

use std::time::Duration;

use tether_core::TetherError;

use crate::candidate::AddressFamily;

/// Failures while acquiring or using a relay session
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// No candidate with this id in the table
    #[error("Unknown relay candidate {candidate}")]
    UnknownCandidate {
        /// Requested candidate id
        candidate: u32,
    },

    /// The candidate has no endpoint for the requested family
    #[error("Relay candidate {candidate} does not support {af}")]
    UnsupportedAddressFamily {
        /// Candidate id
        candidate: u32,
        /// Requested address family
        af: AddressFamily,
    },

    /// The relay handshake did not finish in time
    #[error("Relay handshake with candidate {candidate} timed out after {after:?}")]
    HandshakeTimeout {
        /// Candidate id
        candidate: u32,
        /// Bound that was exceeded
        after: Duration,
    },

    /// The client or relayed endpoint was not resolved in time
    #[error("Relay endpoints from candidate {candidate} not resolved after {after:?}")]
    EndpointResolutionTimeout {
        /// Candidate id
        candidate: u32,
        /// Bound that was exceeded
        after: Duration,
    },

    /// Peer whitelisting did not finish in time
    #[error("Peer whitelist on candidate {candidate} timed out after {after:?}")]
    PeerWhitelistTimeout {
        /// Candidate id
        candidate: u32,
        /// Bound that was exceeded
        after: Duration,
    },

    /// Every candidate in a fallback list failed
    #[error("All {attempted} relay candidates failed")]
    AllCandidatesFailed {
        /// Number of candidates tried
        attempted: usize,
    },

    /// The relay protocol client reported a failure
    #[error("Relay protocol error: {message}")]
    Protocol {
        /// Error message from the protocol layer
        message: String,
    },
}

impl RelayError {
    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Whether a hard time bound was exceeded
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::HandshakeTimeout { .. }
                | Self::EndpointResolutionTimeout { .. }
                | Self::PeerWhitelistTimeout { .. }
        )
    }
}

impl From<RelayError> for TetherError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::UnknownCandidate { .. } => TetherError::not_found(err.to_string()),
            RelayError::UnsupportedAddressFamily { .. } => TetherError::invalid(err.to_string()),
            RelayError::HandshakeTimeout { .. }
            | RelayError::EndpointResolutionTimeout { .. }
            | RelayError::PeerWhitelistTimeout { .. } => TetherError::timeout(err.to_string()),
            RelayError::AllCandidatesFailed { .. } | RelayError::Protocol { .. } => {
                TetherError::network(err.to_string())
            }
        }
    }
}
