//! The key-value service: two routes over three injected capabilities.
//!
//! | Method | Path   | Behavior                         |
//! |--------|--------|----------------------------------|
//! | GET    | `/`    | cached bulk read ([`read_all`])  |
//! | POST   | `/set` | rate-limited write ([`set_value`]) |
//! | *      | *      | `404 Not Found`, plain text       |
//!
//! All state lives behind [`KvStore`], [`ResponseCache`] and
//! [`RateLimiter`]; the handlers themselves keep nothing between requests.

use std::sync::Arc;
use std::time::Duration;

use crate::background::BackgroundTasks;
use crate::cache::{MemoryResponseCache, ResponseCache};
use crate::config::Config;
use crate::context::Context;
use crate::middleware::LoggerMiddleware;
use crate::router::Router;
use crate::security::{FixedWindowLimiter, RateLimiter};
use crate::store::{KvStore, MemoryStore};
use crate::{Request, Response};

pub mod handlers;

pub use handlers::{read_all, set_value};

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KvStore>,
    pub cache: Arc<dyn ResponseCache>,
    pub limiter: Arc<dyn RateLimiter>,
    pub background: BackgroundTasks,
    /// Freshness window advertised on read responses.
    pub cache_ttl: Duration,
    /// Value sent in `Retry-After` on a rate-limit denial.
    pub retry_after: Duration,
}

impl AppState {
    pub fn new(
        store: Arc<dyn KvStore>,
        cache: Arc<dyn ResponseCache>,
        limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        let defaults = Config::default();
        Self {
            store,
            cache,
            limiter,
            background: BackgroundTasks::new(),
            cache_ttl: defaults.cache_ttl(),
            retry_after: defaults.rate_limit_period(),
        }
    }

    /// Builds state backed entirely by in-memory capabilities.
    pub fn in_memory(config: &Config) -> Self {
        Self {
            store: Arc::new(MemoryStore::with_list_limit(config.kv_list_limit)),
            cache: Arc::new(MemoryResponseCache::new(config.cache_ttl())),
            limiter: Arc::new(FixedWindowLimiter::new(
                config.rate_limit_requests,
                config.rate_limit_period(),
            )),
            background: BackgroundTasks::new(),
            cache_ttl: config.cache_ttl(),
            retry_after: config.rate_limit_period(),
        }
    }

    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = retry_after;
        self
    }
}

/// The request handler.
pub struct App {
    state: AppState,
    router: Router,
}

impl App {
    pub fn new(state: AppState) -> Self {
        let mut router = Router::new();
        router.layer(LoggerMiddleware);

        let read_state = state.clone();
        router.get("/", move |ctx: Context| {
            let state = read_state.clone();
            async move { read_all(&state, ctx).await.unwrap_or_else(Response::from) }
        });

        let write_state = state.clone();
        router.post("/set", move |ctx: Context| {
            let state = write_state.clone();
            async move { set_value(&state, ctx).await.unwrap_or_else(Response::from) }
        });

        Self { state, router }
    }

    /// Handles one request end to end.
    pub async fn handle(&self, request: Request) -> Response {
        self.router.route(request).await
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Waits for detached work (cache population) started by earlier requests.
    pub async fn settle(&self) {
        self.state.background.settle().await;
    }
}

#[cfg(test)]
mod tests;
