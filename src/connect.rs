use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::config::Remote;
use crate::error::KVError;
use crate::memory::MemoryStore;
use crate::redb::RedbStore;
use crate::traits::KVStore;

const MEMORY_SCHEME: &str = "memory://";
const FILE_SCHEME: &str = "file://";

/// Connector opens a store handle from a connection descriptor.
pub trait Connector: Send + Sync {
    fn connect(&self, remote: &Remote) -> Result<Arc<dyn KVStore>, KVError>;
}

/// Opens redb files. The url is a filesystem path, optionally `file://`-prefixed.
#[derive(Debug, Default, Clone, Copy)]
pub struct RedbConnector;

impl Connector for RedbConnector {
    fn connect(&self, remote: &Remote) -> Result<Arc<dyn KVStore>, KVError> {
        let path = remote.url.strip_prefix(FILE_SCHEME).unwrap_or(&remote.url);
        if path.is_empty() || path.contains("://") {
            return Err(KVError::Connect(format!(
                "unsupported url for redb: {}",
                remote.url
            )));
        }
        let path = Path::new(path);
        if !path.is_file() {
            return Err(KVError::Connect(format!("no database at {:?}", path)));
        }
        debug!("RedbConnector: opening {:?}", path);
        Ok(Arc::new(RedbStore::open(path)?))
    }
}

/// Registry of named in-process stores, addressed as `memory://<name>`.
#[derive(Default)]
pub struct MemoryConnector {
    stores: RwLock<HashMap<String, Arc<MemoryStore>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `store` reachable under `memory://<name>`.
    pub fn register(&self, name: &str, store: Arc<MemoryStore>) -> Result<(), KVError> {
        let mut stores = self
            .stores
            .write()
            .map_err(|e| KVError::Storage(e.to_string()))?;
        stores.insert(name.to_string(), store);
        Ok(())
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, remote: &Remote) -> Result<Arc<dyn KVStore>, KVError> {
        let name = remote.url.strip_prefix(MEMORY_SCHEME).ok_or_else(|| {
            KVError::Connect(format!("expected {}<name>, got {}", MEMORY_SCHEME, remote.url))
        })?;
        let stores = self
            .stores
            .read()
            .map_err(|e| KVError::Storage(e.to_string()))?;
        let store: Arc<dyn KVStore> = stores
            .get(name)
            .cloned()
            .ok_or_else(|| KVError::Connect(format!("no store registered as {:?}", name)))?;
        Ok(store)
    }
}
