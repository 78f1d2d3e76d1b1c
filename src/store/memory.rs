//! In-memory [`KvStore`] backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{KeyListing, KvStore, StoreError};

/// Page size used when none is configured.
pub const DEFAULT_LIST_LIMIT: usize = 1000;

/// A [`KvStore`] held in process memory.
///
/// Keys enumerate in lexicographic order and a single [`list`](KvStore::list)
/// returns at most `list_limit` of them, mirroring the page size of managed
/// key-value services.
#[derive(Debug)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, String>>,
    list_limit: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_list_limit(DEFAULT_LIST_LIMIT)
    }

    /// Creates a store whose listings stop after `list_limit` keys (minimum 1).
    pub fn with_list_limit(list_limit: usize) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            list_limit: list_limit.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn list(&self) -> Result<KeyListing, StoreError> {
        let records = self.records.read().await;
        let keys: Vec<String> = records.keys().take(self.list_limit).cloned().collect();
        Ok(KeyListing {
            list_complete: keys.len() == records.len(),
            keys,
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}
