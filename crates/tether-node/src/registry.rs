//! Keyed collections of open endpoints
//!
//! A node keeps one [`EndpointRegistry`] per endpoint category. A key can be
//! reserved before its endpoint exists (the slot is then pending) so that a
//! second caller waits for the in-flight acquisition instead of starting its
//! own. Teardown closes every ready endpoint and skips pending slots.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tether_core::Closable;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Endpoint collections, in teardown order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointCategory {
    /// Pipes carrying signaling messages
    SignalPipes,
    /// In-progress TCP hole punches
    TcpPunchClients,
    /// Relay sessions
    RelayClients,
    /// Established peer pipes
    Pipes,
}

impl EndpointCategory {
    /// Every category in the order a node closes them
    pub const TEARDOWN_ORDER: [EndpointCategory; 4] = [
        Self::SignalPipes,
        Self::TcpPunchClients,
        Self::RelayClients,
        Self::Pipes,
    ];
}

impl fmt::Display for EndpointCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SignalPipes => "signal_pipes",
            Self::TcpPunchClients => "tcp_punch_clients",
            Self::RelayClients => "relay_clients",
            Self::Pipes => "pipes",
        };
        f.write_str(name)
    }
}

/// Outcome of [`EndpointRegistry::close_all`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseSummary {
    /// Endpoints closed without error
    pub closed: usize,
    /// Endpoints whose close failed (logged, not propagated)
    pub failed: usize,
    /// Reserved slots still waiting on an acquisition
    pub skipped_pending: usize,
}

/// Result of trying to reserve a key
pub enum Reservation<E: ?Sized> {
    /// The caller now owns the pending slot and must resolve or abandon it
    Reserved,
    /// Another acquisition already holds the slot
    InFlight,
    /// The endpoint already exists
    Ready(Arc<E>),
}

impl<E: ?Sized> fmt::Debug for Reservation<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reserved => f.write_str("Reserved"),
            Self::InFlight => f.write_str("InFlight"),
            Self::Ready(_) => f.write_str("Ready(..)"),
        }
    }
}

enum EndpointSlot<E: ?Sized> {
    Pending(watch::Sender<Option<Arc<E>>>),
    Ready(Arc<E>),
}

/// Mutex-guarded map from key to pending or ready endpoint.
///
/// The lock is only taken for map bookkeeping and never held across an
/// `.await`.
pub struct EndpointRegistry<K, E: ?Sized = dyn Closable> {
    category: EndpointCategory,
    slots: Mutex<HashMap<K, EndpointSlot<E>>>,
}

impl<K, E> EndpointRegistry<K, E>
where
    K: Eq + Hash + Clone + fmt::Debug,
    E: Closable + ?Sized,
{
    /// Empty registry for `category`
    pub fn new(category: EndpointCategory) -> Self {
        Self {
            category,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Category this registry holds
    pub fn category(&self) -> EndpointCategory {
        self.category
    }

    /// Store a ready endpoint, returning the one it replaced.
    pub fn insert(&self, key: K, endpoint: Arc<E>) -> Option<Arc<E>> {
        match self.slots.lock().insert(key, EndpointSlot::Ready(endpoint)) {
            Some(EndpointSlot::Ready(previous)) => Some(previous),
            Some(EndpointSlot::Pending(waiters)) => {
                // Nobody will resolve this reservation now.
                drop(waiters);
                None
            }
            None => None,
        }
    }

    /// Claim `key` for an acquisition that is about to start.
    pub fn reserve(&self, key: K) -> Reservation<E> {
        let mut slots = self.slots.lock();
        match slots.get(&key) {
            Some(EndpointSlot::Ready(endpoint)) => Reservation::Ready(endpoint.clone()),
            Some(EndpointSlot::Pending(_)) => Reservation::InFlight,
            None => {
                let (ready_tx, _ready_rx) = watch::channel(None);
                slots.insert(key, EndpointSlot::Pending(ready_tx));
                Reservation::Reserved
            }
        }
    }

    /// Complete a reservation, waking anyone in [`wait_ready`](Self::wait_ready).
    pub fn resolve(&self, key: K, endpoint: Arc<E>) {
        let previous = self
            .slots
            .lock()
            .insert(key.clone(), EndpointSlot::Ready(endpoint.clone()));
        if let Some(EndpointSlot::Pending(ready_tx)) = previous {
            ready_tx.send_replace(Some(endpoint));
        }
        debug!(category = %self.category, ?key, "endpoint resolved");
    }

    /// Drop a reservation that will never resolve. Waiters see `None`.
    ///
    /// Ready endpoints under the same key are left alone.
    pub fn abandon(&self, key: &K) -> bool {
        let mut slots = self.slots.lock();
        if matches!(slots.get(key), Some(EndpointSlot::Pending(_))) {
            slots.remove(key);
            debug!(category = %self.category, ?key, "reservation abandoned");
            true
        } else {
            false
        }
    }

    /// The ready endpoint under `key`, if any
    pub fn get(&self, key: &K) -> Option<Arc<E>> {
        match self.slots.lock().get(key) {
            Some(EndpointSlot::Ready(endpoint)) => Some(endpoint.clone()),
            _ => None,
        }
    }

    /// Whether `key` is reserved but not yet resolved
    pub fn is_pending(&self, key: &K) -> bool {
        matches!(self.slots.lock().get(key), Some(EndpointSlot::Pending(_)))
    }

    /// Take a ready endpoint out of the registry without closing it.
    pub fn remove(&self, key: &K) -> Option<Arc<E>> {
        let mut slots = self.slots.lock();
        if matches!(slots.get(key), Some(EndpointSlot::Ready(_))) {
            match slots.remove(key) {
                Some(EndpointSlot::Ready(endpoint)) => Some(endpoint),
                _ => None,
            }
        } else {
            None
        }
    }

    /// Number of slots, pending ones included
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Whether no slot is held, pending or ready
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Wait up to `limit` for the endpoint under `key` to become ready.
    ///
    /// Returns `None` on timeout, if the key is unknown, or if the
    /// reservation is abandoned.
    pub async fn wait_ready(&self, key: &K, limit: Duration) -> Option<Arc<E>> {
        let mut ready_rx = {
            let slots = self.slots.lock();
            match slots.get(key) {
                Some(EndpointSlot::Ready(endpoint)) => return Some(endpoint.clone()),
                Some(EndpointSlot::Pending(ready_tx)) => ready_tx.subscribe(),
                None => return None,
            }
        };

        let wait = async move {
            loop {
                let current = ready_rx.borrow_and_update().clone();
                if current.is_some() {
                    return current;
                }
                if ready_rx.changed().await.is_err() {
                    return None;
                }
            }
        };

        tokio::time::timeout(limit, wait).await.ok().flatten()
    }

    /// Close every ready endpoint and remove it from the registry.
    ///
    /// Pending reservations are skipped without blocking. Individual close
    /// failures are logged and counted, never propagated.
    pub async fn close_all(&self) -> CloseSummary {
        let (ready, skipped_pending) = {
            let mut slots = self.slots.lock();
            let ready_keys: Vec<K> = slots
                .iter()
                .filter(|(_, slot)| matches!(slot, EndpointSlot::Ready(_)))
                .map(|(key, _)| key.clone())
                .collect();
            let ready: Vec<(K, Arc<E>)> = ready_keys
                .into_iter()
                .filter_map(|key| match slots.remove(&key) {
                    Some(EndpointSlot::Ready(endpoint)) => Some((key, endpoint)),
                    _ => None,
                })
                .collect();
            (ready, slots.len())
        };

        let outcomes = join_all(ready.into_iter().map(|(key, endpoint)| async move {
            let result = endpoint.close().await;
            (key, endpoint.label(), result)
        }))
        .await;

        let mut summary = CloseSummary {
            skipped_pending,
            ..CloseSummary::default()
        };
        for (key, label, result) in outcomes {
            match result {
                Ok(()) => summary.closed += 1,
                Err(error) => {
                    warn!(category = %self.category, ?key, endpoint = %label, error = %error, "endpoint close failed");
                    summary.failed += 1;
                }
            }
        }

        debug!(
            category = %self.category,
            closed = summary.closed,
            failed = summary.failed,
            skipped_pending = summary.skipped_pending,
            "endpoints closed"
        );
        summary
    }
}

impl<K, E: ?Sized> fmt::Debug for EndpointRegistry<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointRegistry")
            .field("category", &self.category)
            .field("slots", &self.slots.lock().len())
            .finish()
    }
}
