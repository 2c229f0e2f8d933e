//! Queue-fed background workers
//!
//! A node runs one worker per queue (hole-punch requests, signaling
//! messages). Shutdown is an explicit [`QueueMessage::Shutdown`] item rather
//! than a null value, and stopping is two-phase: request (sentinel plus
//! cancellation), then await the task before the handle is released.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tether_core::{CancellationSource, CancellationToken};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::NodeError;

/// Item carried by a worker queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueMessage<T> {
    /// Work for the handler
    Work(T),
    /// Poison item: the worker exits when it reaches this
    Shutdown,
}

/// Which node queue a worker serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueKind {
    /// Hole-punch requests
    Punch,
    /// Outbound signaling messages
    Signal,
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Punch => f.write_str("punch"),
            Self::Signal => f.write_str("signal"),
        }
    }
}

/// Why a worker loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerExit {
    /// Reached the shutdown item
    Sentinel,
    /// Cancellation was requested
    Cancelled,
    /// Every sender was dropped
    QueueClosed,
}

/// Processes items taken off a worker queue
#[async_trait]
pub trait WorkHandler<T>: Send + Sync {
    /// Handle one item. Cancellation may drop this future at any `.await`.
    async fn handle(&self, item: T);
}

/// A spawned worker and the sending half of its queue
pub struct QueueWorker<T> {
    kind: QueueKind,
    queue_tx: mpsc::Sender<QueueMessage<T>>,
    cancel: CancellationSource,
    handle: Mutex<Option<JoinHandle<WorkerExit>>>,
}

impl<T: Send + 'static> QueueWorker<T> {
    /// Spawn the worker on the current Tokio runtime.
    pub fn spawn(kind: QueueKind, capacity: usize, handler: Arc<dyn WorkHandler<T>>) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(capacity.max(1));
        let cancel = CancellationSource::new();
        let handle = tokio::spawn(run_worker(kind, queue_rx, handler, cancel.token()));

        Self {
            kind,
            queue_tx,
            cancel,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Queue this worker serves
    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    /// Whether a task handle is still held
    pub fn is_attached(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Queue an item, waiting for capacity.
    pub async fn submit(&self, item: T) -> Result<(), NodeError> {
        self.queue_tx
            .send(QueueMessage::Work(item))
            .await
            .map_err(|_| NodeError::QueueClosed { queue: self.kind })
    }

    /// Queue the shutdown item without waiting.
    ///
    /// Returns `false` if the queue was full or already closed; the
    /// cancellation request still stops the worker in that case.
    pub fn enqueue_shutdown(&self) -> bool {
        match self.queue_tx.try_send(QueueMessage::Shutdown) {
            Ok(()) => true,
            Err(error) => {
                debug!(queue = %self.kind, error = %error, "shutdown item not queued");
                false
            }
        }
    }

    /// First phase of stopping: ask the worker to exit.
    pub fn request_cancel(&self) {
        self.cancel.cancel();
    }

    /// Second phase: await the worker, then release its handle.
    ///
    /// A worker that has not exited within `limit` is aborted. Returns
    /// `None` when no handle was held or the task did not finish cleanly.
    pub async fn join(&self, limit: Duration) -> Option<WorkerExit> {
        let mut handle = self.handle.lock().take()?;

        match tokio::time::timeout(limit, &mut handle).await {
            Ok(Ok(exit)) => {
                debug!(queue = %self.kind, ?exit, "worker stopped");
                Some(exit)
            }
            Ok(Err(join_error)) => {
                warn!(queue = %self.kind, error = %join_error, "worker task failed");
                None
            }
            Err(_) => {
                warn!(queue = %self.kind, ?limit, "worker did not stop in time, aborting");
                handle.abort();
                None
            }
        }
    }
}

async fn run_worker<T>(
    kind: QueueKind,
    mut queue_rx: mpsc::Receiver<QueueMessage<T>>,
    handler: Arc<dyn WorkHandler<T>>,
    cancel: Arc<dyn CancellationToken>,
) -> WorkerExit {
    loop {
        // Queue first: an already queued shutdown item wins over cancellation.
        let message = tokio::select! {
            biased;
            message = queue_rx.recv() => message,
            _ = cancel.cancelled() => return WorkerExit::Cancelled,
        };

        match message {
            Some(QueueMessage::Work(item)) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return WorkerExit::Cancelled,
                    _ = handler.handle(item) => {}
                }
            }
            Some(QueueMessage::Shutdown) => {
                debug!(queue = %kind, "shutdown item reached");
                return WorkerExit::Sentinel;
            }
            None => return WorkerExit::QueueClosed,
        }
    }
}
