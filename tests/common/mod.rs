#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use parking_lot::Mutex;
use serde_json::Value;
use tower::ServiceExt;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use mctrack_ingest::analytics::{AnalyticsError, AnalyticsStore};
use mctrack_ingest::auth::{hash_api_key, KeyAuthority, KeyAuthorityConfig};
use mctrack_ingest::buffer::{WriteBuffer, WriteBufferConfig};
use mctrack_ingest::cache::{CacheError, KeyValueCache, MemoryCache};
use mctrack_ingest::database::{DatabaseError, KeyStore};
use mctrack_ingest::events::Normalizer;
use mctrack_ingest::limiter::{RateLimitScope, RateLimiter};
use mctrack_ingest::middleware::API_KEY_HEADER;
use mctrack_ingest::server::{app, AppState};
use mctrack_ingest::types::ApiKeyIdentity;

pub const NETWORK_KEY: &str = "mct_network0000000000000000000000";
pub const GAMEMODE_KEY: &str = "mct_gamemode000000000000000000000";
pub const UNKNOWN_KEY: &str = "mct_unknown00000000000000000000000";

/// Relational key store double; can be switched into an outage
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: Mutex<HashMap<String, ApiKeyIdentity>>,
    down: AtomicBool,
    lookups: AtomicUsize,
}

impl MemoryKeyStore {
    pub fn insert(&self, plaintext: &str, identity: ApiKeyIdentity) {
        self.keys.lock().insert(hash_api_key(plaintext), identity);
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn find_active_key(&self, key_hash: &str) -> Result<Option<ApiKeyIdentity>, DatabaseError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(DatabaseError::Timeout(Duration::from_secs(2)));
        }
        Ok(self.keys.lock().get(key_hash).cloned())
    }

    async fn touch_last_used(&self, _key_id: Uuid) -> Result<(), DatabaseError> {
        Ok(())
    }
}

/// Analytics store double recording every successful insert
#[derive(Default)]
pub struct RecordingStore {
    rows: Mutex<HashMap<String, Vec<Value>>>,
    failures_remaining: AtomicUsize,
    attempts: AtomicUsize,
}

impl RecordingStore {
    pub fn failing(times: usize) -> Self {
        let store = Self::default();
        store.failures_remaining.store(times, Ordering::SeqCst);
        store
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.rows.lock().get(table).cloned().unwrap_or_default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalyticsStore for RecordingStore {
    async fn bulk_insert(&self, table: &str, rows: &[Value]) -> Result<(), AnalyticsError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AnalyticsError::Transport("connection refused".to_string()));
        }
        self.rows.lock().entry(table.to_string()).or_default().extend_from_slice(rows);
        Ok(())
    }
}

/// Cache whose every command fails, as when Redis is unreachable
pub struct DownCache;

#[async_trait]
impl KeyValueCache for DownCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Connection("connection refused".to_string()))
    }
    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Connection("connection refused".to_string()))
    }
    async fn increment(&self, _key: &str) -> Result<i64, CacheError> {
        Err(CacheError::Connection("connection refused".to_string()))
    }
    async fn set_expiry(&self, _key: &str, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Connection("connection refused".to_string()))
    }
    async fn ttl_remaining(&self, _key: &str) -> Result<Option<Duration>, CacheError> {
        Err(CacheError::Connection("connection refused".to_string()))
    }
    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Connection("connection refused".to_string()))
    }
}

pub struct TestOptions {
    pub rate_limit: Option<u64>,
    /// Back the limiter with a failing cache
    pub limiter_cache_down: bool,
    pub max_batch_size: usize,
    pub max_buffered_records: usize,
    pub max_batch_events: usize,
    pub store: Arc<RecordingStore>,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            rate_limit: Some(1000),
            limiter_cache_down: false,
            max_batch_size: 1000,
            max_buffered_records: 10_000,
            max_batch_events: 100,
            store: Arc::new(RecordingStore::default()),
        }
    }
}

/// Router wired to in-memory doubles, driven in-process
pub struct TestApp {
    pub router: Router,
    pub keys: Arc<MemoryKeyStore>,
    pub store: Arc<RecordingStore>,
    pub buffer: Arc<WriteBuffer>,
    pub network: ApiKeyIdentity,
    pub gamemode: ApiKeyIdentity,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_options(TestOptions::default())
    }

    pub fn with_options(options: TestOptions) -> Self {
        init_tracing();

        let network = ApiKeyIdentity::new(Uuid::new_v4(), Uuid::new_v4(), None);
        let gamemode = ApiKeyIdentity::new(Uuid::new_v4(), network.network_id, Some(Uuid::new_v4()));

        let keys = Arc::new(MemoryKeyStore::default());
        keys.insert(NETWORK_KEY, network.clone());
        keys.insert(GAMEMODE_KEY, gamemode.clone());

        let cache: Arc<dyn KeyValueCache> = Arc::new(MemoryCache::new());
        let buffer = WriteBuffer::new(
            options.store.clone(),
            WriteBufferConfig {
                max_batch_size: options.max_batch_size,
                max_buffered_records: options.max_buffered_records,
                insert_timeout: Duration::from_secs(5),
            },
        );

        let limiter_cache: Arc<dyn KeyValueCache> = if options.limiter_cache_down {
            Arc::new(DownCache)
        } else {
            cache.clone()
        };
        let limiter = options.rate_limit.map(|max| {
            Arc::new(RateLimiter::new(
                limiter_cache,
                RateLimitScope::Ingestion,
                max,
                Duration::from_secs(60),
                Duration::from_millis(250),
            ))
        });

        let state = AppState {
            authority: Arc::new(KeyAuthority::new(cache, keys.clone(), KeyAuthorityConfig::default())),
            limiter,
            normalizer: Normalizer::new(),
            buffer: buffer.clone(),
            max_batch_events: options.max_batch_events,
            max_body_bytes: 1024 * 1024,
        };

        Self {
            router: app(state),
            keys,
            store: options.store,
            buffer,
            network,
            gamemode,
        }
    }

    pub async fn post(&self, path: &str, key: Option<&str>, body: &Value) -> Result<TestResponse> {
        let mut request = Request::post(path).header("content-type", "application/json");
        if let Some(key) = key {
            request = request.header(API_KEY_HEADER, key);
        }
        self.send(request.body(Body::from(serde_json::to_vec(body)?))?).await
    }

    pub async fn post_raw(&self, path: &str, key: &str, body: &'static str) -> Result<TestResponse> {
        let request = Request::post(path)
            .header("content-type", "application/json")
            .header(API_KEY_HEADER, key)
            .body(Body::from(body))?;
        self.send(request).await
    }

    pub async fn get(&self, path: &str, key: Option<&str>) -> Result<TestResponse> {
        let mut request = Request::get(path);
        if let Some(key) = key {
            request = request.header(API_KEY_HEADER, key);
        }
        self.send(request.body(Body::empty())?).await
    }

    async fn send(&self, request: Request<Body>) -> Result<TestResponse> {
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok(TestResponse { status, headers, body })
    }
}

/// Route service logs to the test harness; set RUST_LOG to see them
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub fn session_start(player: Uuid) -> Value {
    serde_json::json!({
        "playerUuid": player.to_string(),
        "playerName": "Steve",
        "domain": "play.example.net",
        "ipAddress": "203.0.113.7",
        "platform": "java"
    })
}
