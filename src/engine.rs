//! The batch engine: plans operations into bounded groups, commits each group
//! atomically and falls back to per-item writes when a group is rejected.
//!
//! Groups are processed one at a time, in order. A key's final state is always
//! the result of exactly one commit attempt or one fallback attempt.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::atomic::AtomicWrite;
use crate::config::BatchConfig;
use crate::connect::{Connector, RedbConnector};
use crate::error::KVError;
use crate::key::Key;
use crate::outcome::BatchOutcome;
use crate::planner::{Group, Operation, Planner};
use crate::selector::{List, Selector, resolve_keys};
use crate::traits::{Consistency, KVStore};

/// BatchEngine writes and deletes large key sets through a [`KVStore`],
/// reporting exactly which keys the store rejected.
pub struct BatchEngine {
    store: Arc<dyn KVStore>,
    config: BatchConfig,
    connector: Arc<dyn Connector>,
}

impl BatchEngine {
    /// Create an engine over `store`. Remote stores are opened with
    /// [`RedbConnector`] unless another connector is supplied.
    pub fn new(store: Arc<dyn KVStore>, config: BatchConfig) -> Self {
        Self {
            store,
            config,
            connector: Arc::new(RedbConnector),
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn store(&self) -> &Arc<dyn KVStore> {
        &self.store
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub(crate) fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    /// Write every entry. When a key repeats, the last value wins and the key
    /// keeps the position of its first occurrence.
    pub fn batch_write<I, V>(&self, entries: I) -> BatchOutcome
    where
        I: IntoIterator<Item = (Key, V)>,
        V: Into<Vec<u8>>,
    {
        let mut positions: BTreeMap<Key, usize> = BTreeMap::new();
        let mut ops: Vec<Operation> = Vec::new();

        for (key, value) in entries {
            let value = value.into();
            match positions.get(&key) {
                Some(&at) => ops[at] = Operation::Set(key, value),
                None => {
                    positions.insert(key.clone(), ops.len());
                    ops.push(Operation::Set(key, value));
                }
            }
        }

        self.apply(ops)
    }

    /// Serialize each value as JSON, then [`BatchEngine::batch_write`] them.
    pub fn batch_write_json<'a, I, T>(&self, entries: I) -> Result<BatchOutcome, KVError>
    where
        I: IntoIterator<Item = (Key, &'a T)>,
        T: Serialize + 'a,
    {
        let encoded = entries
            .into_iter()
            .map(|(key, value)| {
                serde_json::to_vec(value)
                    .map(|bytes| (key, bytes))
                    .map_err(|e| KVError::Serialization(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.batch_write(encoded))
    }

    /// Delete an explicit key list or every key a range selector matches.
    ///
    /// The selector is fully resolved before anything is deleted, so an
    /// invalid selector or a listing fault fails the call with `Err` and
    /// leaves the store untouched. Rejected deletes are reported in the
    /// outcome.
    pub fn batch_delete(&self, source: impl Into<Selector>) -> Result<BatchOutcome, KVError> {
        let selector = source.into();
        let explicit = matches!(selector, Selector::Keys(_));
        let keys = resolve_keys(self.store.as_ref(), &selector, self.config.list_page_size)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = BTreeSet::new();
        let ops = keys
            .into_iter()
            .filter(|key| !explicit || seen.insert(key.clone()))
            .map(Operation::Delete);

        Ok(self.apply(ops))
    }

    /// Delete every key in the store.
    pub fn wipe_all(&self) -> Result<BatchOutcome, KVError> {
        self.batch_delete(Selector::all())
    }

    /// Exact number of entries matching `selector`, by full scan.
    ///
    /// One store round trip per page; meant for verification, not hot paths.
    pub fn count(&self, selector: &Selector) -> Result<usize, KVError> {
        match selector.key_range()? {
            Some(range) => List::new(
                self.store.as_ref(),
                range,
                self.config.list_page_size,
                Consistency::Strong,
            )
            .try_fold(0, |n, entry| entry.map(|_| n + 1)),
            None => {
                let mut seen = BTreeSet::new();
                let mut n = 0;
                if let Selector::Keys(keys) = selector {
                    for key in keys {
                        if seen.insert(key) && self.store.get(key)?.is_some() {
                            n += 1;
                        }
                    }
                }
                Ok(n)
            }
        }
    }

    pub fn count_all(&self) -> Result<usize, KVError> {
        self.count(&Selector::all())
    }

    pub(crate) fn apply<I>(&self, ops: I) -> BatchOutcome
    where
        I: IntoIterator<Item = Operation>,
    {
        let planner = Planner::new(&self.config);
        let mut outcome = BatchOutcome::new();
        for (index, group) in planner.plan(ops).enumerate() {
            self.commit_group(index, &group, &mut outcome);
        }
        debug!(
            "BatchEngine: {} succeeded, {} failed",
            outcome.succeeded,
            outcome.failed_keys.len()
        );
        outcome
    }

    /// Commit one group atomically, or hand it to the per-item fallback.
    fn commit_group(&self, index: usize, group: &Group, outcome: &mut BatchOutcome) {
        let mut txn = AtomicWrite::new(self.store.as_ref());
        for op in group.operations() {
            txn.stage(op.as_mutation());
        }

        match txn.commit() {
            Ok(()) => {
                debug!(
                    "BatchEngine: group {} committed ({} ops, {} bytes)",
                    index,
                    group.len(),
                    group.bytes()
                );
                outcome.record_success(group.len());
            }
            Err(e) => {
                warn!(
                    "BatchEngine: group {} rejected ({} ops): {}, retrying per item",
                    index,
                    group.len(),
                    e
                );
                self.retry_individually(group, outcome);
            }
        }
    }

    /// Apply each operation on its own. One failure never stops the rest.
    fn retry_individually(&self, group: &Group, outcome: &mut BatchOutcome) {
        for op in group.operations() {
            let result = match op {
                Operation::Set(key, value) => self.store.set(key, value),
                Operation::Delete(key) => self.store.delete(key),
            };
            match result {
                Ok(()) => outcome.record_success(1),
                Err(e) => {
                    debug!("BatchEngine: {} failed: {}", op.key(), e);
                    outcome.record_failure(op.key().clone());
                }
            }
        }
    }
}
