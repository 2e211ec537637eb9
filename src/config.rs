use crate::error::KVError;
use crate::traits::StoreLimits;

/// Maximum number of mutations the store accepts in one atomic commit.
pub const MAX_ITEMS: usize = 1000;

/// Maximum total bytes the store accepts in one atomic commit.
pub const MAX_TXN_BYTES: usize = 819_000;

/// Maximum bytes of a single value.
pub const MAX_ITEM_BYTES: usize = 65_536;

/// Per-group byte budget: one item of headroom below the transaction ceiling.
pub const MAX_GROUP_BYTES: usize = MAX_TXN_BYTES - MAX_ITEM_BYTES;

/// Entries fetched per round trip when iterating a range.
pub const LIST_PAGE_SIZE: usize = 500;

/// Tunables of the batch engine.
///
/// Defaults match the limits of the bundled backends. Callers targeting a store
/// with different ceilings build this directly or via [`BatchConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum operations per atomic group.
    pub max_items: usize,

    /// Store-imposed ceiling on the size of one atomic commit.
    pub max_txn_bytes: usize,

    /// Store-imposed ceiling on the size of one item.
    pub max_item_bytes: usize,

    /// Page size used by range iteration.
    pub list_page_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_items: MAX_ITEMS,
            max_txn_bytes: MAX_TXN_BYTES,
            max_item_bytes: MAX_ITEM_BYTES,
            list_page_size: LIST_PAGE_SIZE,
        }
    }
}

impl BatchConfig {
    /// Byte budget of one planned group.
    pub fn max_group_bytes(&self) -> usize {
        self.max_txn_bytes.saturating_sub(self.max_item_bytes)
    }

    /// Read overrides from the process environment.
    ///
    /// Supported variables:
    /// - `BATCHKV_MAX_ITEMS`
    /// - `BATCHKV_MAX_TXN_BYTES`
    /// - `BATCHKV_MAX_ITEM_BYTES`
    /// - `BATCHKV_LIST_PAGE_SIZE`
    pub fn from_env() -> Result<Self, KVError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`BatchConfig::from_env`], with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, KVError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = BatchConfig::default();

        let read = |name: &str, target: &mut usize| -> Result<(), KVError> {
            if let Some(raw) = lookup(name) {
                *target = raw.trim().parse().map_err(|e| {
                    KVError::Config(format!("{}={:?}: {}", name, raw, e))
                })?;
            }
            Ok(())
        };

        read("BATCHKV_MAX_ITEMS", &mut config.max_items)?;
        read("BATCHKV_MAX_TXN_BYTES", &mut config.max_txn_bytes)?;
        read("BATCHKV_MAX_ITEM_BYTES", &mut config.max_item_bytes)?;
        read("BATCHKV_LIST_PAGE_SIZE", &mut config.list_page_size)?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), KVError> {
        if self.max_items == 0 {
            return Err(KVError::Config("max_items must be positive".to_string()));
        }
        if self.list_page_size == 0 {
            return Err(KVError::Config(
                "list_page_size must be positive".to_string(),
            ));
        }
        if self.max_item_bytes >= self.max_txn_bytes {
            return Err(KVError::Config(format!(
                "max_item_bytes ({}) must be below max_txn_bytes ({})",
                self.max_item_bytes, self.max_txn_bytes
            )));
        }
        Ok(())
    }

    /// Limits a bundled backend ([`crate::MemoryStore`], [`crate::RedbStore`])
    /// enforces when configured like this engine.
    pub fn store_limits(&self) -> StoreLimits {
        StoreLimits {
            max_mutations: self.max_items,
            max_txn_bytes: self.max_txn_bytes,
            max_value_bytes: self.max_item_bytes,
        }
    }
}

/// Connection descriptor of a remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    /// Location understood by the engine's connector, e.g. a redb file path or
    /// `memory://name`.
    pub url: String,

    pub access_token: Option<String>,
}

impl Remote {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            access_token: None,
        }
    }

    /// Build from `BATCHKV_REMOTE_URL` and optional `BATCHKV_REMOTE_ACCESS_TOKEN`.
    pub fn from_env() -> Result<Self, KVError> {
        let url = std::env::var("BATCHKV_REMOTE_URL")
            .map_err(|_| KVError::Connect("BATCHKV_REMOTE_URL is not set".to_string()))?;
        Ok(Self {
            url,
            access_token: std::env::var("BATCHKV_REMOTE_ACCESS_TOKEN").ok(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_derive_group_budget() {
        let config = BatchConfig::default();
        assert_eq!(config.max_items, 1000);
        assert_eq!(config.max_group_bytes(), 819_000 - 65_536);
        assert_eq!(config.max_group_bytes(), MAX_GROUP_BYTES);
    }

    #[test]
    fn lookup_overrides_defaults() {
        let vars: HashMap<&str, &str> =
            [
                ("BATCHKV_MAX_ITEMS", "10"),
                ("BATCHKV_MAX_TXN_BYTES", " 4096 "),
                ("BATCHKV_MAX_ITEM_BYTES", "1024"),
            ]
            .into_iter()
            .collect();
        let config =
            BatchConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(config.max_items, 10);
        assert_eq!(config.max_txn_bytes, 4096);
        assert_eq!(config.max_group_bytes(), 3072);
        assert_eq!(config.list_page_size, LIST_PAGE_SIZE);
    }

    #[test]
    fn lookup_rejects_bad_values() {
        let err = BatchConfig::from_lookup(|name| {
            (name == "BATCHKV_MAX_ITEMS").then(|| "many".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("BATCHKV_MAX_ITEMS"));

        let err = BatchConfig::from_lookup(|name| {
            (name == "BATCHKV_MAX_ITEMS").then(|| "0".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("max_items"));
    }
}
