use std::collections::BTreeSet;

use crate::key::Key;

/// Result of a batch call.
///
/// For a single batch call, every key submitted is either counted in
/// `succeeded` or listed in `failed_keys`, never both. `ok` is true exactly
/// when nothing failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub ok: bool,
    pub failed_keys: BTreeSet<Key>,
    pub succeeded: usize,
}

impl BatchOutcome {
    pub fn new() -> Self {
        Self {
            ok: true,
            failed_keys: BTreeSet::new(),
            succeeded: 0,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.ok
    }

    pub(crate) fn record_success(&mut self, count: usize) {
        self.succeeded += count;
    }

    pub(crate) fn record_failure(&mut self, key: Key) {
        self.failed_keys.insert(key);
        self.ok = false;
    }

    /// Number of keys the call accounted for. Only exact for a single batch
    /// call; after [`BatchOutcome::merge`] it is the sum over phases.
    pub fn total(&self) -> usize {
        self.succeeded + self.failed_keys.len()
    }

    /// Combine the outcome of a later phase into this one.
    ///
    /// `succeeded` counts operations per phase while `failed_keys` is a set, so
    /// a key rejected in one phase stays failed even if a later phase applied
    /// it, and the same key may then appear in both.
    pub fn merge(&mut self, other: BatchOutcome) {
        self.succeeded += other.succeeded;
        self.failed_keys.extend(other.failed_keys);
        self.ok = self.failed_keys.is_empty();
    }
}

impl Default for BatchOutcome {
    fn default() -> Self {
        Self::new()
    }
}
