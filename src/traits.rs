use crate::atomic::Mutation;
use crate::error::KVError;
use crate::key::Key;
use crate::selector::KeyRange;

/// Read consistency requested from the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Consistency {
    /// Reads observe every committed write.
    #[default]
    Strong,

    /// Reads may be slightly stale in exchange for lower latency.
    Eventual,
}

/// One listed entry: decoded key and raw value.
pub type Entry = (Key, Vec<u8>);

/// KVStore is the transactional key-value store the batch engine writes through.
///
/// Keys are [`Key`] tuples; implementations persist them in their
/// order-preserving encoding so that range listing follows key order.
/// Single-item `set`/`delete` run as implicit one-item transactions.
pub trait KVStore: Send + Sync {
    /// Get the value for a key. Returns None if the key does not exist.
    fn get(&self, key: &Key) -> Result<Option<Vec<u8>>, KVError>;

    /// Get with an explicit read consistency. Stores that only offer strong
    /// reads may ignore the hint.
    fn get_with(&self, key: &Key, consistency: Consistency) -> Result<Option<Vec<u8>>, KVError> {
        let _ = consistency;
        self.get(key)
    }

    /// Set a key-value pair.
    fn set(&self, key: &Key, value: &[u8]) -> Result<(), KVError>;

    /// Delete a key. Deleting a missing key is not an error.
    fn delete(&self, key: &Key) -> Result<(), KVError>;

    /// Apply all mutations atomically: either every one takes effect or none.
    fn commit(&self, mutations: &[Mutation<'_>]) -> Result<(), KVError>;

    /// List up to `limit` entries of `range` in key order, starting strictly
    /// after the encoded key `after` when given.
    fn list_page(
        &self,
        range: &KeyRange,
        after: Option<&[u8]>,
        limit: usize,
        consistency: Consistency,
    ) -> Result<Vec<Entry>, KVError>;
}

/// Ceilings a store enforces on writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    pub max_mutations: usize,
    pub max_txn_bytes: usize,
    pub max_value_bytes: usize,
}

impl StoreLimits {
    pub fn check_value(&self, key: &Key, value: &[u8]) -> Result<(), KVError> {
        if value.len() > self.max_value_bytes {
            return Err(KVError::LimitExceeded(format!(
                "value for {} is {} bytes, limit is {}",
                key,
                value.len(),
                self.max_value_bytes
            )));
        }
        Ok(())
    }

    pub fn check_commit(&self, mutations: &[Mutation<'_>]) -> Result<(), KVError> {
        if mutations.len() > self.max_mutations {
            return Err(KVError::LimitExceeded(format!(
                "{} mutations in one commit, limit is {}",
                mutations.len(),
                self.max_mutations
            )));
        }

        let mut total = 0;
        for mutation in mutations {
            if let Mutation::Set { key, value } = mutation {
                self.check_value(key, value)?;
            }
            total += mutation.size();
        }
        if total > self.max_txn_bytes {
            return Err(KVError::LimitExceeded(format!(
                "commit is {} bytes, limit is {}",
                total, self.max_txn_bytes
            )));
        }
        Ok(())
    }
}

impl Default for StoreLimits {
    fn default() -> Self {
        crate::config::BatchConfig::default().store_limits()
    }
}
