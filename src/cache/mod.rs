//! Response caching capability.
//!
//! A [`ResponseCache`] stores whole [`Response`] snapshots under the
//! identity of the request that produced them ([`CacheKey`]: method plus
//! absolute URL). Entries are only ever replaced or left to expire; nothing
//! in the service invalidates them on write, so a cached read may lag the
//! store by up to its freshness window.
//!
//! [`MemoryResponseCache`] is the in-process backend.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::{Method, Request, Response};

pub mod memory;

pub use memory::MemoryResponseCache;

/// Errors surfaced by a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("response is not cacheable: {0}")]
    NotCacheable(String),
}

/// Identity of a cached response: request method and absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    method: Method,
    url: String,
}

impl CacheKey {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
        }
    }

    /// Derives the key for `request`.
    pub fn for_request(request: &Request) -> Self {
        Self::new(request.method().clone(), request.url())
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A response cache reached through single-call operations.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Returns a fresh cached response for `key`, or `None`.
    async fn get(&self, key: &CacheKey) -> Result<Option<Response>, CacheError>;

    /// Stores `response` under `key`, replacing any previous entry.
    async fn put(&self, key: CacheKey, response: Response) -> Result<(), CacheError>;
}

/// Reads the `max-age` directive from a `Cache-Control` value.
pub(crate) fn max_age(cache_control: &str) -> Option<u64> {
    cache_control.split(',').find_map(|directive| {
        let (name, value) = directive.trim().split_once('=')?;
        if name.trim().eq_ignore_ascii_case("max-age") {
            value.trim().trim_matches('"').parse().ok()
        } else {
            None
        }
    })
}

/// Returns `true` when a `Cache-Control` value forbids storing the response.
pub(crate) fn is_no_store(cache_control: &str) -> bool {
    cache_control
        .split(',')
        .any(|directive| directive.trim().eq_ignore_ascii_case("no-store"))
}
