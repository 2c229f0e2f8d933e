//! Shared, ordered record of calls made on test doubles

use std::sync::Arc;

use parking_lot::Mutex;

/// Append-only log shared between doubles. Clones write to the same log.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Snapshot of every entry in call order
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Index of the first entry equal to `entry`
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries.lock().iter().position(|e| e == entry)
    }

    /// Entries starting with `prefix`, in call order
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().iter().filter(|e| *e == entry).count()
    }

    /// Assert that each entry in `expected` appears, in this order.
    pub fn assert_order(&self, expected: &[&str]) {
        let positions: Vec<usize> = expected
            .iter()
            .map(|entry| {
                self.position(entry)
                    .unwrap_or_else(|| panic!("{entry:?} not in call log {:?}", self.entries()))
            })
            .collect();
        assert!(
            positions.windows(2).all(|pair| pair[0] < pair[1]),
            "expected order {expected:?}, got {:?}",
            self.entries()
        );
    }
}
