//! In-memory [`ResponseCache`] backend with per-entry freshness windows.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use super::{CacheError, CacheKey, ResponseCache, is_no_store, max_age};
use crate::Response;

struct CacheEntry {
    response: Response,
    expires_at: Instant,
}

/// A [`ResponseCache`] held in process memory.
///
/// An entry's lifetime comes from the stored response's
/// `Cache-Control: max-age`, falling back to `default_ttl` when the header
/// has none. Responses marked `no-store` are rejected. Expired entries are
/// dropped when next looked up or when a new entry is stored.
pub struct MemoryResponseCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    default_ttl: Duration,
}

impl MemoryResponseCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Drops every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of stored entries, including ones that expired but were not yet dropped.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn ttl_for(&self, response: &Response) -> Result<Duration, CacheError> {
        let Some(cache_control) = response.headers().get("cache-control") else {
            return Ok(self.default_ttl);
        };
        if is_no_store(cache_control) {
            return Err(CacheError::NotCacheable(format!(
                "Cache-Control: {cache_control}"
            )));
        }
        Ok(max_age(cache_control).map_or(self.default_ttl, Duration::from_secs))
    }
}

#[async_trait]
impl ResponseCache for MemoryResponseCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Response>, CacheError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => {
                    return Ok(Some(entry.response.clone()));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.expires_at <= now) {
            debug!(%key, "dropping expired cache entry");
            entries.remove(key);
        }
        Ok(None)
    }

    async fn put(&self, key: CacheKey, response: Response) -> Result<(), CacheError> {
        let ttl = self.ttl_for(&response)?;
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key,
            CacheEntry {
                response,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }
}
