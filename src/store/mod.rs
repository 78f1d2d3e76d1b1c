//! Key-value storage capability.
//!
//! The service never owns its data: records live behind the [`KvStore`]
//! trait and are reached through three single-call operations. A record is
//! a flat `(key, value)` string pair; writes overwrite, nothing is deleted,
//! and concurrent writers race with last-write-wins semantics at the store.
//!
//! [`MemoryStore`] is the in-process backend used by the binary and tests.

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;

pub use memory::MemoryStore;

/// Errors surfaced by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("storage operation `{operation}` failed: {reason}")]
    Operation {
        operation: &'static str,
        reason: String,
    },
}

/// One page of key names from [`KvStore::list`].
///
/// Keys are in the store's enumeration order. `list_complete` is `false`
/// when the backend stopped at its page size and more keys exist; callers
/// that do not paginate see only this first page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyListing {
    pub keys: Vec<String>,
    pub list_complete: bool,
}

/// A key-value store reached through single-call operations.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Enumerates stored key names in a single call.
    async fn list(&self) -> Result<KeyListing, StoreError>;

    /// Reads one value. `Ok(None)` means the key does not exist (any more).
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes one value, replacing any previous value for `key`.
    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
}
