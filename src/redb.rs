use std::path::Path;
use std::sync::Arc;

use redb::{Database, TableDefinition};

use crate::atomic::Mutation;
use crate::error::KVError;
use crate::key::Key;
use crate::selector::KeyRange;
use crate::traits::{Consistency, Entry, KVStore, StoreLimits};

const TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("kv");

/// Durable store on a single redb file. Keys are stored in their
/// order-preserving encoding so redb's range scans follow tuple order.
///
/// redb serializes write transactions, so every read is strongly consistent and
/// the consistency hint is ignored.
pub struct RedbStore {
    db: Arc<Database>,
    limits: StoreLimits,
}

impl RedbStore {
    /// Open or create a redb database at the given path.
    pub fn open(path: &Path) -> Result<Self, KVError> {
        Self::open_with_limits(path, StoreLimits::default())
    }

    pub fn open_with_limits(path: &Path, limits: StoreLimits) -> Result<Self, KVError> {
        let db = Database::create(path).map_err(|e| KVError::Storage(e.to_string()))?;

        // Ensure the table exists by doing a write transaction.
        let write_txn = db
            .begin_write()
            .map_err(|e| KVError::Storage(e.to_string()))?;
        {
            let _table = write_txn
                .open_table(TABLE)
                .map_err(|e| KVError::Storage(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| KVError::Storage(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            limits,
        })
    }
}

impl KVStore for RedbStore {
    fn get(&self, key: &Key) -> Result<Option<Vec<u8>>, KVError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| KVError::Storage(e.to_string()))?;
        let table = read_txn
            .open_table(TABLE)
            .map_err(|e| KVError::Storage(e.to_string()))?;

        match table.get(key.encode().as_slice()) {
            Ok(Some(val)) => Ok(Some(val.value().to_vec())),
            Ok(None) => Ok(None),
            Err(e) => Err(KVError::Storage(e.to_string())),
        }
    }

    fn set(&self, key: &Key, value: &[u8]) -> Result<(), KVError> {
        self.commit(&[Mutation::Set { key, value }])
    }

    fn delete(&self, key: &Key) -> Result<(), KVError> {
        self.commit(&[Mutation::Delete { key }])
    }

    fn commit(&self, mutations: &[Mutation<'_>]) -> Result<(), KVError> {
        self.limits.check_commit(mutations)?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| KVError::Storage(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(TABLE)
                .map_err(|e| KVError::Storage(e.to_string()))?;
            for mutation in mutations {
                let encoded = mutation.key().encode();
                match mutation {
                    Mutation::Set { value, .. } => {
                        table
                            .insert(encoded.as_slice(), *value)
                            .map_err(|e| KVError::Storage(e.to_string()))?;
                    }
                    Mutation::Delete { .. } => {
                        table
                            .remove(encoded.as_slice())
                            .map_err(|e| KVError::Storage(e.to_string()))?;
                    }
                }
            }
        }
        // Dropping an uncommitted write transaction aborts it, so an error
        // above leaves the database untouched.
        write_txn
            .commit()
            .map_err(|e| KVError::Storage(e.to_string()))?;
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

        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| KVError::Storage(e.to_string()))?;
        let table = read_txn
            .open_table(TABLE)
            .map_err(|e| KVError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        let iter = table
            .range::<&[u8]>(bounds)
            .map_err(|e| KVError::Storage(e.to_string()))?;

        for entry in iter.take(limit) {
            let entry = entry.map_err(|e| KVError::Storage(e.to_string()))?;
            let key = Key::decode(entry.0.value())?;
            let value = entry.1.value().to_vec();
            results.push((key, value));
        }

        Ok(results)
    }
}
