//! Route handlers for the read and write paths.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::AppState;
use crate::cache::CacheKey;
use crate::context::Context;
use crate::error::{AppError, AppResult};
use crate::security::ClientId;
use crate::{Response, StatusCode};

/// Header reporting whether a read was served from cache.
pub const CACHE_STATUS_HEADER: &str = "X-Cache-Status";

#[derive(Serialize)]
struct SetResponse<'a> {
    success: bool,
    key: &'a str,
    value: &'a str,
}

/// `GET /`: every stored pair as one pretty-printed JSON object, cache-aside.
///
/// A fresh cached snapshot is returned as-is apart from
/// `X-Cache-Status: HIT`, without touching the store. On a miss the store is
/// listed once, each listed key is read individually (keys that vanished in
/// between are skipped), and the result is returned with
/// `X-Cache-Status: MISS`. A copy is handed to the cache as detached work
/// whose failure never reaches the caller.
///
/// Writes do not invalidate the snapshot, so a hit can trail the store by up
/// to the advertised `max-age`. Only the store's first listing page is read.
pub async fn read_all(state: &AppState, ctx: Context) -> AppResult<Response> {
    let cache_key = CacheKey::for_request(ctx.request());

    if let Some(mut cached) = state.cache.get(&cache_key).await? {
        debug!(key = %cache_key, "cache hit");
        cached.set_header(CACHE_STATUS_HEADER, "HIT");
        return Ok(cached);
    }
    debug!(key = %cache_key, "cache miss");

    let listing = state.store.list().await?;
    if !listing.list_complete {
        warn!(
            listed = listing.keys.len(),
            "key listing truncated by the store; serving the first page only"
        );
    }

    let mut records = Map::with_capacity(listing.keys.len());
    for name in listing.keys {
        match state.store.get(&name).await? {
            Some(value) => {
                records.insert(name, Value::String(value));
            }
            None => debug!(key = %name, "listed key no longer exists, skipping"),
        }
    }

    let response = Response::json_pretty(StatusCode::Ok, &records)
        .map_err(AppError::Serialize)?
        .header(
            "Cache-Control",
            format!("public, max-age={}", state.cache_ttl.as_secs()),
        )
        .header(CACHE_STATUS_HEADER, "MISS");

    let cache = Arc::clone(&state.cache);
    let snapshot = response.clone();
    state.background.spawn("cache-populate", async move {
        cache.put(cache_key, snapshot).await
    });

    Ok(response)
}

/// `POST /set`: store one `{"key", "value"}` pair behind the rate limiter.
///
/// The limiter is consulted before the body is read; a denial, an
/// unparseable body, or a missing field each end the request before the
/// store is touched. The write overwrites unconditionally.
pub async fn set_value(state: &AppState, ctx: Context) -> AppResult<Response> {
    let client = ClientId::from_headers(ctx.request().headers());
    let outcome = state.limiter.limit(&client).await?;
    if !outcome.success {
        warn!(%client, anonymous = client.is_unknown(), "rate limit exceeded");
        return Err(AppError::RateLimitExceeded {
            retry_after_secs: state.retry_after.as_secs(),
        });
    }

    let body: Value = ctx.json().map_err(AppError::MalformedRequestBody)?;
    let (key, value) = required_pair(&body).ok_or(AppError::ValidationFailure)?;

    state.store.put(key, value).await?;
    debug!(%client, %key, "stored value");

    Response::json(
        StatusCode::Ok,
        &SetResponse {
            success: true,
            key,
            value,
        },
    )
    .map_err(AppError::Serialize)
}

/// Extracts non-empty string `key` and `value` fields from a JSON object.
fn required_pair(body: &Value) -> Option<(&str, &str)> {
    let field = |name: &str| {
        body.get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    };
    Some((field("key")?, field("value")?))
}
