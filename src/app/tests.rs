use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::*;
use crate::StatusCode;
use crate::cache::{CacheError, CacheKey};
use crate::security::{ClientId, LimiterError, RateLimitOutcome};
use crate::store::{KeyListing, StoreError};

// ── Request helpers ───────────────────────────────────────────────────────────

fn request(method: &str, path: &str, headers: &[(&str, &str)], body: &str) -> Request {
    let mut raw = format!("{method} {path} HTTP/1.1\r\nHost: kv.test\r\n");
    for (name, value) in headers {
        raw.push_str(&format!("{name}: {value}\r\n"));
    }
    raw.push_str(&format!("Content-Length: {}\r\n\r\n{body}", body.len()));
    let (req, _) = Request::parse(raw.as_bytes()).unwrap();
    req
}

fn get_root() -> Request {
    request("GET", "/", &[], "")
}

fn post_set(body: &str) -> Request {
    request("POST", "/set", &[("CF-Connecting-IP", "203.0.113.1")], body)
}

fn json_body(response: &Response) -> Value {
    serde_json::from_slice(response.payload()).unwrap()
}

// ── Capability doubles ────────────────────────────────────────────────────────

/// Memory store that counts calls.
#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    lists: AtomicUsize,
    gets: AtomicUsize,
    puts: AtomicUsize,
}

#[async_trait]
impl KvStore for CountingStore {
    async fn list(&self) -> Result<KeyListing, StoreError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list().await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, value).await
    }
}

/// Store whose listing is fixed and may name keys that no longer exist.
struct ScriptedStore {
    listed: Vec<&'static str>,
    present: Vec<(&'static str, &'static str)>,
}

#[async_trait]
impl KvStore for ScriptedStore {
    async fn list(&self) -> Result<KeyListing, StoreError> {
        Ok(KeyListing {
            keys: self.listed.iter().map(|k| (*k).to_owned()).collect(),
            list_complete: true,
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .present
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| (*v).to_owned()))
    }

    async fn put(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

struct BrokenStore;

#[async_trait]
impl KvStore for BrokenStore {
    async fn list(&self) -> Result<KeyListing, StoreError> {
        Err(StoreError::Unavailable("offline".into()))
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("offline".into()))
    }

    async fn put(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::Operation {
            operation: "put",
            reason: "quota".into(),
        })
    }
}

/// Limiter that rejects every request and records the keys it saw.
#[derive(Default)]
struct DenyingLimiter {
    seen: std::sync::Mutex<Vec<String>>,
}

#[async_trait]
impl RateLimiter for DenyingLimiter {
    async fn limit(&self, key: &ClientId) -> Result<RateLimitOutcome, LimiterError> {
        self.seen.lock().unwrap().push(key.as_str().to_owned());
        Ok(RateLimitOutcome { success: false })
    }
}

/// Cache that never holds anything and fails every store.
#[derive(Default)]
struct RejectingCache {
    puts: AtomicUsize,
}

#[async_trait]
impl ResponseCache for RejectingCache {
    async fn get(&self, _key: &CacheKey) -> Result<Option<Response>, CacheError> {
        Ok(None)
    }

    async fn put(&self, _key: CacheKey, _response: Response) -> Result<(), CacheError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Unavailable("cache write refused".into()))
    }
}

/// A cache whose writes never complete.
struct StalledCache;

#[async_trait]
impl ResponseCache for StalledCache {
    async fn get(&self, _key: &CacheKey) -> Result<Option<Response>, CacheError> {
        Ok(None)
    }

    async fn put(&self, _key: CacheKey, _response: Response) -> Result<(), CacheError> {
        std::future::pending().await
    }
}

struct Fixture {
    app: App,
    store: Arc<CountingStore>,
    cache: Arc<MemoryResponseCache>,
}

fn fixture() -> Fixture {
    let config = Config::default();
    let store = Arc::new(CountingStore::default());
    let cache = Arc::new(MemoryResponseCache::new(config.cache_ttl()));
    let limiter = Arc::new(FixedWindowLimiter::new(
        config.rate_limit_requests,
        config.rate_limit_period(),
    ));
    let state = AppState::new(store.clone(), cache.clone(), limiter);
    Fixture {
        app: App::new(state),
        store,
        cache,
    }
}

// ── Write then read ───────────────────────────────────────────────────────────

#[tokio::test]
async fn write_then_cold_read_returns_the_pair() {
    let f = fixture();

    let res = f.app.handle(post_set(r#"{"key":"a","value":"1"}"#)).await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(res.headers().get("content-type"), Some("application/json"));
    assert_eq!(res.text(), Some(r#"{"success":true,"key":"a","value":"1"}"#));

    let res = f.app.handle(get_root()).await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(res.text(), Some("{\n  \"a\": \"1\"\n}"));
    assert_eq!(res.headers().get("content-type"), Some("application/json"));
    assert_eq!(res.headers().get("cache-control"), Some("public, max-age=60"));
    assert_eq!(res.headers().get("x-cache-status"), Some("MISS"));
}

#[tokio::test]
async fn written_pairs_appear_after_cache_is_cleared() {
    let f = fixture();
    for (k, v) in [("alpha", "1"), ("beta", "two"), ("gamma", "ünï")] {
        let body = json!({"key": k, "value": v}).to_string();
        assert_eq!(f.app.handle(post_set(&body)).await.status(), StatusCode::Ok);
        f.app.settle().await;
        f.cache.clear().await;

        let res = f.app.handle(get_root()).await;
        assert_eq!(res.headers().get("x-cache-status"), Some("MISS"));
        assert_eq!(json_body(&res)[k], v);
    }
}

#[tokio::test]
async fn empty_store_reads_as_empty_object() {
    let f = fixture();
    let res = f.app.handle(get_root()).await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(res.text(), Some("{}"));
}

// ── Cache behavior ────────────────────────────────────────────────────────────

#[tokio::test]
async fn second_read_is_a_hit_even_after_a_write() {
    let f = fixture();
    f.app.handle(post_set(r#"{"key":"a","value":"1"}"#)).await;

    let first = f.app.handle(get_root()).await;
    f.app.settle().await;

    f.app.handle(post_set(r#"{"key":"b","value":"2"}"#)).await;
    let second = f.app.handle(get_root()).await;

    assert_eq!(first.headers().get("x-cache-status"), Some("MISS"));
    assert_eq!(second.headers().get("x-cache-status"), Some("HIT"));
    assert_eq!(second.status(), StatusCode::Ok);
    assert_eq!(second.payload(), first.payload());
    assert_eq!(second.headers().get("content-type"), Some("application/json"));
    assert_eq!(second.headers().get("cache-control"), Some("public, max-age=60"));
    assert_eq!(second.headers().get_all("x-cache-status").count(), 1);
}

#[tokio::test]
async fn hit_does_not_read_the_store() {
    let f = fixture();
    f.app.handle(post_set(r#"{"key":"a","value":"1"}"#)).await;
    f.app.handle(get_root()).await;
    f.app.settle().await;

    let lists = f.store.lists.load(Ordering::SeqCst);
    let gets = f.store.gets.load(Ordering::SeqCst);
    for _ in 0..3 {
        f.app.handle(get_root()).await;
    }
    assert_eq!(f.store.lists.load(Ordering::SeqCst), lists);
    assert_eq!(f.store.gets.load(Ordering::SeqCst), gets);
}

#[tokio::test(start_paused = true)]
async fn read_after_expiry_recomputes() {
    let f = fixture();
    f.app.handle(post_set(r#"{"key":"a","value":"1"}"#)).await;
    f.app.handle(get_root()).await;
    f.app.settle().await;

    f.app.handle(post_set(r#"{"key":"a","value":"2"}"#)).await;

    tokio::time::advance(Duration::from_secs(59)).await;
    let stale = f.app.handle(get_root()).await;
    assert_eq!(stale.headers().get("x-cache-status"), Some("HIT"));
    assert_eq!(json_body(&stale)["a"], "1");

    tokio::time::advance(Duration::from_secs(2)).await;
    let fresh = f.app.handle(get_root()).await;
    assert_eq!(fresh.headers().get("x-cache-status"), Some("MISS"));
    assert_eq!(json_body(&fresh)["a"], "2");
}

#[tokio::test]
async fn cache_is_keyed_by_full_url() {
    let f = fixture();
    f.app.handle(get_root()).await;
    f.app.settle().await;

    let other_query = f.app.handle(request("GET", "/?v=2", &[], "")).await;
    assert_eq!(other_query.headers().get("x-cache-status"), Some("MISS"));

    let same = f.app.handle(get_root()).await;
    assert_eq!(same.headers().get("x-cache-status"), Some("HIT"));
}

#[tokio::test]
async fn failed_cache_population_is_swallowed() {
    let cache = Arc::new(RejectingCache::default());
    let state = AppState::new(
        Arc::new(MemoryStore::new()),
        cache.clone(),
        Arc::new(FixedWindowLimiter::new(10, Duration::from_secs(60))),
    );
    let app = App::new(state);

    for _ in 0..2 {
        let res = app.handle(get_root()).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.headers().get("x-cache-status"), Some("MISS"));
        app.settle().await;
    }
    assert_eq!(cache.puts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn read_does_not_wait_for_cache_population() {
    let state = AppState::new(
        Arc::new(MemoryStore::new()),
        Arc::new(StalledCache),
        Arc::new(FixedWindowLimiter::new(10, Duration::from_secs(60))),
    );
    let app = App::new(state);

    let res = tokio::time::timeout(Duration::from_secs(1), app.handle(get_root()))
        .await
        .expect("read blocked on the cache write");
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(res.headers().get("x-cache-status"), Some("MISS"));
    assert_eq!(app.state().background.pending(), 1);
}

#[tokio::test]
async fn cache_ttl_is_advertised() {
    let config = Config {
        cache_ttl_secs: 15,
        ..Config::default()
    };
    let app = App::new(AppState::in_memory(&config));
    let res = app.handle(get_root()).await;
    assert_eq!(res.headers().get("cache-control"), Some("public, max-age=15"));
}

// ── Bulk read assembly ────────────────────────────────────────────────────────

#[tokio::test]
async fn vanished_keys_are_skipped_and_order_is_kept() {
    let store = ScriptedStore {
        listed: vec!["zeta", "ghost", "alpha"],
        present: vec![("alpha", "A"), ("zeta", "Z")],
    };
    let state = AppState::new(
        Arc::new(store),
        Arc::new(MemoryResponseCache::new(Duration::from_secs(60))),
        Arc::new(FixedWindowLimiter::new(10, Duration::from_secs(60))),
    );
    let res = App::new(state).handle(get_root()).await;

    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(res.text(), Some("{\n  \"zeta\": \"Z\",\n  \"alpha\": \"A\"\n}"));
}

#[tokio::test]
async fn truncated_listing_serves_first_page() {
    let config = Config {
        kv_list_limit: 2,
        ..Config::default()
    };
    let state = AppState::in_memory(&config);
    for key in ["k1", "k2", "k3"] {
        state.store.put(key, "v").await.unwrap();
    }
    let res = App::new(state).handle(get_root()).await;
    let body = json_body(&res);
    assert_eq!(body.as_object().unwrap().len(), 2);
    assert!(body.get("k3").is_none());
}

// ── Write validation ──────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_fields_are_rejected_without_writing() {
    let f = fixture();
    for body in [
        r#"{"key":"a"}"#,
        r#"{"value":"1"}"#,
        r#"{"key":"","value":"1"}"#,
        r#"{"key":"a","value":"","other":"x"}"#,
        r#"{"other":"x","extra":[1,2]}"#,
        r#"[]"#,
        r#"42"#,
    ] {
        let res = f.app.handle(post_set(body)).await;
        assert_eq!(res.status(), StatusCode::BadRequest, "{body}");
        assert_eq!(
            json_body(&res),
            json!({
                "error": "Missing required fields",
                "message": "Request must include \"key\" and \"value\" fields"
            })
        );
    }
    assert_eq!(f.store.puts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unparseable_body_is_rejected_without_writing() {
    let f = fixture();
    for body in ["", "{", "key=a&value=1", r#"{"key":"a","value":"1""#] {
        let res = f.app.handle(post_set(body)).await;
        assert_eq!(res.status(), StatusCode::BadRequest, "{body:?}");
        assert_eq!(res.text(), Some(r#"{"error":"Invalid JSON in request body"}"#));
    }
    assert_eq!(f.store.puts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn write_overwrites_existing_value() {
    let f = fixture();
    f.app.handle(post_set(r#"{"key":"a","value":"1"}"#)).await;
    f.app.handle(post_set(r#"{"key":"a","value":"2"}"#)).await;
    assert_eq!(f.store.inner.get("a").await.unwrap().as_deref(), Some("2"));
}

// ── Rate limiting ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn denied_write_gets_429_and_never_touches_storage() {
    let store = Arc::new(CountingStore::default());
    let limiter = Arc::new(DenyingLimiter::default());
    let state = AppState::new(
        store.clone(),
        Arc::new(MemoryResponseCache::new(Duration::from_secs(60))),
        limiter.clone(),
    );
    let app = App::new(state);

    for body in [r#"{"key":"a","value":"1"}"#, "not json", "{}"] {
        let res = app.handle(post_set(body)).await;
        assert_eq!(res.status(), StatusCode::TooManyRequests);
        assert_eq!(res.headers().get("retry-after"), Some("60"));
        assert_eq!(
            json_body(&res),
            json!({
                "error": "Rate limit exceeded",
                "message": "Too many requests. Please try again later."
            })
        );
    }
    assert_eq!(store.puts.load(Ordering::SeqCst), 0);
    assert_eq!(limiter.seen.lock().unwrap().as_slice(), ["203.0.113.1"; 3]);
}

#[tokio::test]
async fn limiter_key_follows_header_precedence() {
    let limiter = Arc::new(DenyingLimiter::default());
    let state = AppState::new(
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryResponseCache::new(Duration::from_secs(60))),
        limiter.clone(),
    );
    let app = App::new(state);

    let body = r#"{"key":"a","value":"1"}"#;
    app.handle(request(
        "POST",
        "/set",
        &[("X-Forwarded-For", "10.0.0.1"), ("CF-Connecting-IP", "1.1.1.1")],
        body,
    ))
    .await;
    app.handle(request("POST", "/set", &[("X-Forwarded-For", "10.0.0.1")], body))
        .await;
    app.handle(request("POST", "/set", &[], body)).await;

    assert_eq!(
        limiter.seen.lock().unwrap().as_slice(),
        ["1.1.1.1", "10.0.0.1", "unknown"]
    );
}

#[tokio::test]
async fn eleventh_write_in_a_period_is_limited() {
    let f = fixture();
    for i in 0..10 {
        let body = json!({"key": format!("k{i}"), "value": "v"}).to_string();
        assert_eq!(f.app.handle(post_set(&body)).await.status(), StatusCode::Ok);
    }
    let res = f.app.handle(post_set(r#"{"key":"k10","value":"v"}"#)).await;
    assert_eq!(res.status(), StatusCode::TooManyRequests);
    assert_eq!(f.store.puts.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn anonymous_clients_share_one_bucket() {
    let f = fixture();
    let body = r#"{"key":"a","value":"1"}"#;
    for _ in 0..10 {
        let res = f.app.handle(request("POST", "/set", &[], body)).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    let other_anonymous = f.app.handle(request("POST", "/set", &[("Host", "x")], body)).await;
    assert_eq!(other_anonymous.status(), StatusCode::TooManyRequests);

    let identified = f
        .app
        .handle(request("POST", "/set", &[("CF-Connecting-IP", "9.9.9.9")], body))
        .await;
    assert_eq!(identified.status(), StatusCode::Ok);
}

#[tokio::test]
async fn retry_after_follows_configured_period() {
    let limiter = Arc::new(DenyingLimiter::default());
    let state = AppState::new(
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryResponseCache::new(Duration::from_secs(60))),
        limiter,
    )
    .with_retry_after(Duration::from_secs(30));
    let res = App::new(state).handle(post_set("{}")).await;
    assert_eq!(res.headers().get("retry-after"), Some("30"));
}

// ── Routing and faults ────────────────────────────────────────────────────────

#[tokio::test]
async fn unmatched_routes_are_plain_not_found() {
    let f = fixture();
    for req in [
        request("GET", "/unknown", &[], ""),
        request("GET", "/set", &[], ""),
        request("POST", "/", &[], "{}"),
        request("PUT", "/set", &[], r#"{"key":"a","value":"1"}"#),
    ] {
        let res = f.app.handle(req).await;
        assert_eq!(res.status(), StatusCode::NotFound);
        assert_eq!(res.text(), Some("Not Found"));
    }
    assert_eq!(f.store.puts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn storage_faults_surface_as_500() {
    let state = AppState::new(
        Arc::new(BrokenStore),
        Arc::new(MemoryResponseCache::new(Duration::from_secs(60))),
        Arc::new(FixedWindowLimiter::new(10, Duration::from_secs(60))),
    );
    let app = App::new(state);

    let read = app.handle(get_root()).await;
    assert_eq!(read.status(), StatusCode::InternalServerError);

    let write = app.handle(post_set(r#"{"key":"a","value":"1"}"#)).await;
    assert_eq!(write.status(), StatusCode::InternalServerError);
    assert_eq!(json_body(&write), json!({"error": "Internal Server Error"}));
}
