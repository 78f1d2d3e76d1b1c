//! Rate limiting for the write path.
//!
//! Quota is partitioned by [`ClientId`], taken from proxy-supplied headers.
//! Clients that present neither header all share the single
//! [`ClientId::UNKNOWN`] bucket, so one anonymous caller can exhaust the quota
//! for every other anonymous caller.
//!
//! The counting itself happens behind the [`RateLimiter`] trait.
//! [`FixedWindowLimiter`] is the in-process backend.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::http::Headers;

/// Header set by the edge proxy to the connecting client's address.
pub const CONNECTING_IP_HEADER: &str = "CF-Connecting-IP";

/// Fallback header carrying the forwarding chain.
pub const FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";

/// Errors surfaced by a rate limiter backend.
#[derive(Debug, Error)]
pub enum LimiterError {
    #[error("rate limiter unavailable: {0}")]
    Unavailable(String),
}

/// The key a request's quota is accounted under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// Shared identity for clients without identifying headers.
    pub const UNKNOWN: &'static str = "unknown";

    /// Derives the identity from the first non-empty of `CF-Connecting-IP`
    /// and `X-Forwarded-For`, else [`ClientId::UNKNOWN`].
    ///
    /// The `X-Forwarded-For` value is used verbatim, including any proxy chain.
    pub fn from_headers(headers: &Headers) -> Self {
        let id = headers
            .get_non_empty(CONNECTING_IP_HEADER)
            .or_else(|| headers.get_non_empty(FORWARDED_FOR_HEADER))
            .unwrap_or(Self::UNKNOWN);
        Self(id.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Verdict for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitOutcome {
    /// `false` once the key has exhausted its quota for the current period.
    pub success: bool,
}

/// A rate limiter reached through a single call per request.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Counts one request against `key` and reports whether it is admitted.
    async fn limit(&self, key: &ClientId) -> Result<RateLimitOutcome, LimiterError>;
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window counter: at most `limit` admissions per key per `period`.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    limit: u32,
    period: Duration,
    windows: Mutex<HashMap<ClientId, Window>>,
}

impl FixedWindowLimiter {
    pub fn new(limit: u32, period: Duration) -> Self {
        Self {
            limit,
            period,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

#[async_trait]
impl RateLimiter for FixedWindowLimiter {
    async fn limit(&self, key: &ClientId) -> Result<RateLimitOutcome, LimiterError> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        windows.retain(|_, w| now.duration_since(w.started) < self.period);

        let window = windows.entry(key.clone()).or_insert(Window {
            started: now,
            count: 0,
        });
        window.count = window.count.saturating_add(1);

        Ok(RateLimitOutcome {
            success: window.count <= self.limit,
        })
    }
}
