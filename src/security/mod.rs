//! Request admission: client identification and rate limiting.

pub mod rate_limit;

pub use rate_limit::{
    ClientId, FixedWindowLimiter, LimiterError, RateLimitOutcome, RateLimiter,
};
