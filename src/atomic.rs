use tracing::debug;

use crate::error::KVError;
use crate::key::Key;
use crate::traits::KVStore;

/// A write staged into an atomic group. Borrows key and value from the caller
/// so a rejected group can be replayed without copies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mutation<'a> {
    Set { key: &'a Key, value: &'a [u8] },
    Delete { key: &'a Key },
}

impl<'a> Mutation<'a> {
    pub fn key(&self) -> &'a Key {
        match self {
            Mutation::Set { key, .. } | Mutation::Delete { key } => key,
        }
    }

    /// Bytes this mutation occupies in a store transaction.
    pub fn size(&self) -> usize {
        match self {
            Mutation::Set { key, value } => key.encoded_len() + value.len(),
            Mutation::Delete { key } => key.encoded_len(),
        }
    }
}

/// AtomicWrite stages mutations and applies them with one commit.
///
/// ```text
/// let mut txn = AtomicWrite::new(store);
/// txn.set(&k1, b"v1").delete(&k2);
/// txn.commit()?;
/// ```
pub struct AtomicWrite<'a> {
    store: &'a dyn KVStore,
    mutations: Vec<Mutation<'a>>,
}

impl<'a> AtomicWrite<'a> {
    pub fn new(store: &'a dyn KVStore) -> Self {
        Self {
            store,
            mutations: Vec::new(),
        }
    }

    pub fn set(&mut self, key: &'a Key, value: &'a [u8]) -> &mut Self {
        self.mutations.push(Mutation::Set { key, value });
        self
    }

    pub fn delete(&mut self, key: &'a Key) -> &mut Self {
        self.mutations.push(Mutation::Delete { key });
        self
    }

    pub fn stage(&mut self, mutation: Mutation<'a>) -> &mut Self {
        self.mutations.push(mutation);
        self
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Commit every staged mutation in one store transaction. A failed commit
    /// leaves the store untouched.
    pub fn commit(self) -> Result<(), KVError> {
        if self.mutations.is_empty() {
            return Ok(());
        }
        debug!("AtomicWrite: committing {} mutations", self.mutations.len());
        self.store.commit(&self.mutations)
    }
}
