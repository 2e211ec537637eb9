use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use batch_kv::{
    BatchConfig, BatchEngine, Consistency, Entry, KVError, KVStore, Key, KeyRange, MemoryConnector,
    MemoryStore, Mutation, RedbStore, Remote, Selector, key,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Counts atomic commits and rejects writes to poisoned keys.
struct Instrumented {
    inner: Arc<dyn KVStore>,
    poisoned: BTreeSet<Key>,
    commits: AtomicUsize,
}

impl Instrumented {
    fn new(inner: Arc<dyn KVStore>) -> Self {
        Self {
            inner,
            poisoned: BTreeSet::new(),
            commits: AtomicUsize::new(0),
        }
    }

    fn poison(mut self, keys: impl IntoIterator<Item = Key>) -> Self {
        self.poisoned.extend(keys);
        self
    }

    fn check(&self, key: &Key) -> Result<(), KVError> {
        if self.poisoned.contains(key) {
            return Err(KVError::Conflict(format!("{} rejected", key)));
        }
        Ok(())
    }
}

impl KVStore for Instrumented {
    fn get(&self, key: &Key) -> Result<Option<Vec<u8>>, KVError> {
        self.inner.get(key)
    }

    fn set(&self, key: &Key, value: &[u8]) -> Result<(), KVError> {
        self.check(key)?;
        self.inner.set(key, value)
    }

    fn delete(&self, key: &Key) -> Result<(), KVError> {
        self.check(key)?;
        self.inner.delete(key)
    }

    fn commit(&self, mutations: &[Mutation<'_>]) -> Result<(), KVError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        for mutation in mutations {
            self.check(mutation.key())?;
        }
        self.inner.commit(mutations)
    }

    fn list_page(
        &self,
        range: &KeyRange,
        after: Option<&[u8]>,
        limit: usize,
        consistency: Consistency,
    ) -> Result<Vec<Entry>, KVError> {
        self.inner.list_page(range, after, limit, consistency)
    }
}

fn numbered(prefix: &str, n: i64, tag: &str) -> Vec<(Key, Vec<u8>)> {
    (0..n)
        .map(|i| (key![prefix, i], format!("{}-{}", tag, i).into_bytes()))
        .collect()
}

#[test]
fn scenario_a_empty_write() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    store.set(&key!["existing"], b"1").unwrap();
    let engine = BatchEngine::new(store, BatchConfig::default());

    let before = engine.count_all().unwrap();
    let outcome = engine.batch_write(Vec::<(Key, Vec<u8>)>::new());
    assert!(outcome.ok);
    assert!(outcome.failed_keys.is_empty());
    assert_eq!(engine.count_all().unwrap(), before);
}

#[test]
fn scenario_b_write_past_item_ceiling() {
    init_tracing();
    let store = Arc::new(Instrumented::new(Arc::new(MemoryStore::new())));
    let engine = BatchEngine::new(store.clone(), BatchConfig::default());

    let outcome = engine.batch_write(numbered("key", 1015, "v"));
    assert!(outcome.ok);
    assert_eq!(outcome.succeeded, 1015);
    assert!(store.commits.load(Ordering::SeqCst) >= 2);
    assert_eq!(engine.count_all().unwrap(), 1015);
}

#[test]
fn scenario_b_on_redb() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RedbStore::open(&dir.path().join("local.redb")).unwrap());
    let engine = BatchEngine::new(store, BatchConfig::default());

    let outcome = engine.batch_write(numbered("key", 1015, "v"));
    assert!(outcome.ok);
    assert_eq!(engine.count_all().unwrap(), 1015);
}

#[test]
fn scenario_c_delete_bounded_range() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let engine = BatchEngine::new(store.clone(), BatchConfig::default());
    assert!(engine.batch_write(numbered("key", 1015, "v")).ok);
    let before = engine.count_all().unwrap();

    let selector = Selector::prefix(key!["key"]).with_end(key!["key", 10]);
    let outcome = engine.batch_delete(selector).unwrap();
    assert!(outcome.ok);
    assert_eq!(outcome.succeeded, 10);
    assert_eq!(engine.count_all().unwrap(), before - 10);

    for i in 0..10 {
        assert!(store.get(&key!["key", i]).unwrap().is_none());
    }
    assert!(store.get(&key!["key", 10]).unwrap().is_some());
}

#[test]
fn scenario_d_mirror_everything() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let remote_path = dir.path().join("remote.redb");
    {
        let remote = Arc::new(RedbStore::open(&remote_path).unwrap());
        let seeder = BatchEngine::new(remote, BatchConfig::default());
        assert!(seeder.batch_write(numbered("key", 1015, "remote")).ok);
    }

    let local = Arc::new(RedbStore::open(&dir.path().join("local.redb")).unwrap());
    let engine = BatchEngine::new(local.clone(), BatchConfig::default());
    assert!(engine.batch_write(numbered("old", 40, "local")).ok);
    local.set(&key!["key", 5000], b"stale").unwrap();

    let remote = Remote::new(remote_path.display().to_string());
    let outcome = engine.mirror_from_remote(&remote, None).unwrap();
    assert!(outcome.ok);

    assert_eq!(engine.count_all().unwrap(), 1015);
    assert_eq!(engine.count(&Selector::prefix(key!["old"])).unwrap(), 0);
    assert!(local.get(&key!["key", 5000]).unwrap().is_none());
    assert_eq!(
        local.get(&key!["key", 1014]).unwrap(),
        Some(b"remote-1014".to_vec())
    );
}

#[test]
fn scenario_e_mirror_keeps_unselected_keys() {
    init_tracing();
    let remote = Arc::new(MemoryStore::new());
    let seeder = BatchEngine::new(remote.clone(), BatchConfig::default());
    assert!(seeder.batch_write(numbered("key", 1015, "remote")).ok);

    let connector = MemoryConnector::new();
    connector.register("upstream", remote).unwrap();

    let local = Arc::new(MemoryStore::new());
    let engine = BatchEngine::new(local.clone(), BatchConfig::default())
        .with_connector(Arc::new(connector));
    assert!(engine.batch_write(numbered("key", 20, "local")).ok);
    local.set(&key!["key", 9999], b"local-only").unwrap();
    local.set(&key!["keep", "this"], b"kept").unwrap();

    let selectors = [Selector::prefix(key!["key"])];
    let outcome = engine
        .mirror_from_remote(&Remote::new("memory://upstream"), Some(&selectors[..]))
        .unwrap();
    assert!(outcome.ok);

    assert_eq!(local.get(&key!["keep", "this"]).unwrap(), Some(b"kept".to_vec()));
    assert_eq!(engine.count(&Selector::prefix(key!["key"])).unwrap(), 1015);
    assert!(local.get(&key!["key", 9999]).unwrap().is_none());
    assert_eq!(local.get(&key!["key", 0]).unwrap(), Some(b"remote-0".to_vec()));
    assert_eq!(engine.count_all().unwrap(), 1016);
}

#[test]
fn every_key_lands_in_exactly_one_bucket() {
    init_tracing();
    let poisoned: Vec<Key> = [3, 250, 251, 999, 1000, 1400]
        .into_iter()
        .map(|i| key!["key", i])
        .collect();
    let store = Arc::new(
        Instrumented::new(Arc::new(MemoryStore::new())).poison(poisoned.iter().cloned()),
    );
    let config = BatchConfig {
        max_items: 250,
        ..BatchConfig::default()
    };
    let engine = BatchEngine::new(store.clone(), config);

    let input = numbered("key", 1500, "v");
    let outcome = engine.batch_write(input.clone());
    assert!(!outcome.ok);
    assert_eq!(outcome.total(), input.len());
    assert_eq!(
        outcome.failed_keys,
        poisoned.iter().cloned().collect::<BTreeSet<_>>()
    );

    // Succeeded keys are exactly the stored ones.
    assert_eq!(
        engine.count_all().unwrap(),
        input.len() - outcome.failed_keys.len()
    );
    for (key, value) in &input {
        let stored = store.get(key).unwrap();
        if outcome.failed_keys.contains(key) {
            assert!(stored.is_none());
        } else {
            assert_eq!(stored.as_ref(), Some(value));
        }
    }

    // 1500 / 250 groups, one atomic attempt each.
    assert_eq!(store.commits.load(Ordering::SeqCst), 6);
}

#[test]
fn write_then_delete_restores_count() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    store.set(&key!["baseline"], b"x").unwrap();
    let engine = BatchEngine::new(store, BatchConfig::default());
    let before = engine.count_all().unwrap();

    let input = numbered("batch", 2100, "v");
    let keys: Vec<Key> = input.iter().map(|(k, _)| k.clone()).collect();
    assert!(engine.batch_write(input).ok);
    assert_eq!(engine.count(&Selector::prefix(key!["batch"])).unwrap(), 2100);

    let outcome = engine.batch_delete(keys).unwrap();
    assert!(outcome.ok);
    assert_eq!(outcome.succeeded, 2100);
    assert_eq!(engine.count_all().unwrap(), before);
}

#[test]
fn wipe_all_empties_the_store() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let engine = BatchEngine::new(store.clone(), BatchConfig::default());
    assert!(engine.batch_write(numbered("a", 700, "v")).ok);
    assert!(engine.batch_write(numbered("b", 700, "v")).ok);

    let outcome = engine.wipe_all().unwrap();
    assert!(outcome.ok);
    assert_eq!(outcome.succeeded, 1400);
    assert!(store.is_empty().unwrap());
}
