//! # Tether Relay
//!
//! Relay (TURN) fallback for peers that cannot reach each other directly.
//!
//! The relay wire protocol is an external collaborator reached through
//! [`RelayConnector`] and [`RelayProtocolClient`]. This crate decides which
//! configured relay to use and bounds every step of bringing a session up:
//!
//! - [`candidate`]: the read-only candidate relay table
//! - [`manager`]: single-candidate acquisition and ordered fallback
//! - [`session`]: the resulting [`RelaySession`], closed exactly once

#![forbid(unsafe_code)]

pub mod candidate;
pub mod client;
pub mod config;
pub mod error;
pub mod manager;
pub mod session;

pub use candidate::{AddressFamily, CandidateTable, RelayCandidate, RelayCredentials, RelayEndpoint};
pub use client::{
    InboundSender, LocalInterface, RelayClientParams, RelayConnector, RelayDatagram,
    RelayProtocolClient,
};
pub use config::{RelayConfig, RelayTimeouts};
pub use error::RelayError;
pub use manager::{AcquireRequest, PeerAddresses, RelayClientManager};
pub use session::RelaySession;
