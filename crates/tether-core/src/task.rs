//! Runtime-agnostic cancellation primitives.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

/// Cooperative cancellation token.
#[async_trait]
pub trait CancellationToken: Send + Sync {
    /// Resolves when cancellation is requested.
    async fn cancelled(&self);

    /// Whether cancellation has been requested, without waiting
    fn is_cancelled(&self) -> bool;
}

/// Owner side of a watch-backed cancellation signal.
///
/// Cloned tokens all observe the same request; requesting cancellation is
/// idempotent.
#[derive(Debug)]
pub struct CancellationSource {
    cancel_tx: watch::Sender<bool>,
}

impl CancellationSource {
    /// A source nobody has cancelled yet
    pub fn new() -> Self {
        let (cancel_tx, _cancel_rx) = watch::channel(false);
        Self { cancel_tx }
    }

    /// Request cancellation of every token issued by this source.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// A token that fires once [`cancel`](Self::cancel) is called
    pub fn token(&self) -> Arc<dyn CancellationToken> {
        Arc::new(WatchCancellationToken {
            cancel_rx: self.cancel_tx.subscribe(),
        })
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct WatchCancellationToken {
    cancel_rx: watch::Receiver<bool>,
}

#[async_trait]
impl CancellationToken for WatchCancellationToken {
    async fn cancelled(&self) {
        let mut cancel_rx = self.cancel_rx.clone();
        loop {
            if *cancel_rx.borrow() {
                return;
            }
            if cancel_rx.changed().await.is_err() {
                // Source dropped without cancelling: never fires.
                futures::future::pending::<()>().await;
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }
}
