//! # Tether Node
//!
//! Runtime for a traversal node: the punch and signaling queue workers, the
//! four endpoint collections a node keeps open, and the ordered stop
//! sequence that tears all of it down.
//!
//! ```text
//! Running ──stop()──▶ Stopping ──▶ Stopped
//!            1. punch worker: shutdown item, cancel, join
//!            2. signal worker: shutdown item, cancel, join
//!            3. close signal pipes, TCP punch clients, relay clients, pipes
//!            4. close base transport
//!            5. grace period
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod messages;
pub mod node;
pub mod queue;
pub mod registry;

pub use config::{NodeConfig, TetherConfig};
pub use error::NodeError;
pub use lifecycle::{NodeState, StopEvent, StopReport};
pub use logging::init_tracing;
pub use messages::{PunchRequest, SignalMessage};
pub use node::Node;
pub use queue::{QueueKind, QueueMessage, QueueWorker, WorkHandler, WorkerExit};
pub use registry::{CloseSummary, EndpointCategory, EndpointRegistry, Reservation};
