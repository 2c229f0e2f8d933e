//! Recording endpoints and queue handlers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tether_core::{Closable, TetherError};
use tether_node::WorkHandler;
use tokio::sync::Notify;

use crate::log::CallLog;

/// Closable that logs `close:<name>` and can be told to fail
#[derive(Debug)]
pub struct RecordingClosable {
    name: String,
    log: CallLog,
    fail: bool,
    closes: AtomicUsize,
}

impl RecordingClosable {
    pub fn new(name: impl Into<String>, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            log: log.clone(),
            fail: false,
            closes: AtomicUsize::new(0),
        })
    }

    /// A closable whose close is logged and then fails
    pub fn failing(name: impl Into<String>, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            log: log.clone(),
            fail: true,
            closes: AtomicUsize::new(0),
        })
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Closable for RecordingClosable {
    async fn close(&self) -> Result<(), TetherError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.log.record(format!("close:{}", self.name));
        if self.fail {
            return Err(TetherError::network(format!("{} refused to close", self.name)));
        }
        Ok(())
    }

    fn label(&self) -> String {
        self.name.clone()
    }
}

/// Queue handler that keeps every item it receives.
///
/// With [`blocking`](Self::blocking) it never finishes an item, which keeps
/// its worker busy until cancelled.
#[derive(Debug)]
pub struct RecordingHandler<T> {
    name: String,
    log: CallLog,
    items: Mutex<Vec<T>>,
    block: bool,
    received: Notify,
}

impl<T> RecordingHandler<T> {
    pub fn new(name: impl Into<String>, log: &CallLog) -> Arc<Self> {
        Self::build(name, log, false)
    }

    pub fn blocking(name: impl Into<String>, log: &CallLog) -> Arc<Self> {
        Self::build(name, log, true)
    }

    fn build(name: impl Into<String>, log: &CallLog, block: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            log: log.clone(),
            items: Mutex::new(Vec::new()),
            block,
            received: Notify::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Wait until at least `count` items have arrived.
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.received.notified();
            if self.len() >= count {
                return;
            }
            notified.await;
        }
    }
}

impl<T: Clone> RecordingHandler<T> {
    pub fn items(&self) -> Vec<T> {
        self.items.lock().clone()
    }
}

#[async_trait]
impl<T: Send + 'static> WorkHandler<T> for RecordingHandler<T> {
    async fn handle(&self, item: T) {
        self.log.record(format!("handle:{}", self.name));
        self.items.lock().push(item);
        self.received.notify_waiters();
        if self.block {
            futures::future::pending::<()>().await;
        }
    }
}
