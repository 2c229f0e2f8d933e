//! Node states and the record of a stop sequence

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::queue::{QueueKind, WorkerExit};
use crate::registry::{CloseSummary, EndpointCategory};

/// Lifecycle of a node. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    /// Accepting work
    Running,
    /// Teardown in progress
    Stopping,
    /// Fully torn down
    Stopped,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::Stopping => f.write_str("stopping"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// One step taken while stopping a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopEvent {
    /// Shutdown item offered to a queue; `delivered` is false if it was full
    SentinelQueued { queue: QueueKind, delivered: bool },
    /// Cancellation requested for a queue's worker
    CancelRequested { queue: QueueKind },
    /// Worker awaited and its handle released; `None` if it had to be aborted
    WorkerJoined {
        queue: QueueKind,
        exit: Option<WorkerExit>,
    },
    /// One endpoint category closed
    EndpointsClosed {
        category: EndpointCategory,
        summary: CloseSummary,
    },
    /// Base transport closed; `ok` is false if its close failed
    TransportClosed { ok: bool },
    /// Grace period waited out
    GraceElapsed { period: Duration },
}

/// What [`Node::stop`](crate::Node::stop) did, in order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopReport {
    /// Steps in the order they ran
    pub events: Vec<StopEvent>,
    /// Set when the node was already stopping or stopped; `events` is empty
    pub already_stopped: bool,
}

impl StopReport {
    pub(crate) fn already_stopped() -> Self {
        Self {
            events: Vec::new(),
            already_stopped: true,
        }
    }

    pub(crate) fn push(&mut self, event: StopEvent) {
        self.events.push(event);
    }

    /// Index of the first event matching `predicate`
    pub fn position(&self, predicate: impl Fn(&StopEvent) -> bool) -> Option<usize> {
        self.events.iter().position(predicate)
    }

    /// Endpoints closed cleanly across every category
    pub fn endpoints_closed(&self) -> usize {
        self.close_summaries().map(|summary| summary.closed).sum()
    }

    /// Endpoint closes that failed across every category
    pub fn endpoint_failures(&self) -> usize {
        self.close_summaries().map(|summary| summary.failed).sum()
    }

    fn close_summaries(&self) -> impl Iterator<Item = &CloseSummary> {
        self.events.iter().filter_map(|event| match event {
            StopEvent::EndpointsClosed { summary, .. } => Some(summary),
            _ => None,
        })
    }
}
