//! Tether Testing Infrastructure
//!
//! Test doubles shared by the integration tests of every Tether crate: a
//! scripted relay protocol client, recording endpoints and handlers, and a
//! [`CallLog`] they can all write to so ordering across components can be
//! asserted.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! tether-testkit = { path = "../tether-testkit" }
//! ```
//!
//! Only use it from a crate's `tests/` directory; unit tests inside a crate
//! that the testkit itself depends on would see two copies of that crate.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

pub mod endpoints;
pub mod log;
pub mod relay;

pub use endpoints::{RecordingClosable, RecordingHandler};
pub use log::CallLog;
pub use relay::{
    candidate, dual_stack_candidate, interface, table, v6_only_candidate, RelayBehavior,
    ScriptedConnector, ScriptedRelayClient,
};
