//! # Tether Core
//!
//! Foundation layer for the Tether traversal coordination stack.
//!
//! ## Modules
//!
//! - [`codec`]: identifier codec placing binary ids into text signaling messages
//! - [`agreement`]: agreement rounds over redundant concurrent attempts
//! - [`task`]: cancellation tokens for background workers
//! - [`endpoint`]: the [`Closable`] contract for everything a node holds open
//! - [`config`]: TOML loading and validation
//! - [`errors`]: the unified [`TetherError`]

#![forbid(unsafe_code)]

pub mod agreement;
pub mod codec;
pub mod config;
pub mod endpoint;
pub mod errors;
pub mod task;

pub use agreement::{agree, bounded, threshold_gather, AgreementOutcome};
pub use codec::{Charset, CodecError};
pub use config::ConfigValidation;
pub use endpoint::Closable;
pub use errors::{Result, TetherError};
pub use task::{CancellationSource, CancellationToken};
