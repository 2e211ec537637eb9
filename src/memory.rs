use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::atomic::Mutation;
use crate::error::KVError;
use crate::key::Key;
use crate::selector::KeyRange;
use crate::traits::{Consistency, Entry, KVStore, StoreLimits};

/// MemoryStore is an in-process KVStore over a sorted map of encoded keys.
///
/// Commits take the write lock once, so concurrent readers see either none or
/// all of a commit. The same [`StoreLimits`] as the persistent backend apply,
/// which makes it a faithful stand-in for tests.
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    limits: StoreLimits,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_limits(StoreLimits::default())
    }

    pub fn with_limits(limits: StoreLimits) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            limits,
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> Result<usize, KVError> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, KVError> {
        Ok(self.read()?.is_empty())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>, KVError> {
        self.entries
            .read()
            .map_err(|e| KVError::Storage(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>, KVError> {
        self.entries
            .write()
            .map_err(|e| KVError::Storage(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KVStore for MemoryStore {
    fn get(&self, key: &Key) -> Result<Option<Vec<u8>>, KVError> {
        Ok(self.read()?.get(&key.encode()).cloned())
    }

    fn set(&self, key: &Key, value: &[u8]) -> Result<(), KVError> {
        self.limits.check_value(key, value)?;
        self.write()?.insert(key.encode(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &Key) -> Result<(), KVError> {
        self.write()?.remove(&key.encode());
        Ok(())
    }

    fn commit(&self, mutations: &[Mutation<'_>]) -> Result<(), KVError> {
        self.limits.check_commit(mutations)?;

        let mut entries = self.write()?;
        for mutation in mutations {
            match mutation {
                Mutation::Set { key, value } => {
                    entries.insert(key.encode(), value.to_vec());
                }
                Mutation::Delete { key } => {
                    entries.remove(&key.encode());
                }
            }
        }
        Ok(())
    }

    fn list_page(
        &self,
        range: &KeyRange,
        after: Option<&[u8]>,
        limit: usize,
        _consistency: Consistency,
    ) -> Result<Vec<Entry>, KVError> {
        let Some(bounds) = range.resume_bounds(after) else {
            return Ok(Vec::new());
        };

        let entries = self.read()?;
        let mut results = Vec::new();
        for (key, value) in entries.range::<[u8], _>(bounds).take(limit) {
            results.push((Key::decode(key)?, value.clone()));
        }
        Ok(results)
    }
}
