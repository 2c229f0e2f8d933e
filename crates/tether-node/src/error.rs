//! Node errors

use tether_core::TetherError;

use crate::lifecycle::NodeState;
use crate::queue::QueueKind;

/// Failures submitting work to a node
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    /// The node is stopping or stopped
    #[error("Node is not running (state: {state})")]
    NotRunning {
        /// State at the time of the call
        state: NodeState,
    },

    /// The worker behind a queue has exited
    #[error("{queue} queue is closed")]
    QueueClosed {
        /// Which queue rejected the item
        queue: QueueKind,
    },
}

impl From<NodeError> for TetherError {
    fn from(err: NodeError) -> Self {
        TetherError::invalid(err.to_string())
    }
}
