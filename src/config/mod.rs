use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub analytics: AnalyticsConfig,
    pub buffer: BufferConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub max_body_bytes: usize,
    pub max_batch_events: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub query_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// When unset the service falls back to an in-process cache (single node only)
    pub redis_url: Option<String>,
    pub op_timeout_ms: u64,
    pub key_ttl_secs: u64,
    pub negative_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub insert_timeout_ms: u64,
    pub async_insert: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    pub flush_interval_ms: u64,
    pub max_batch_size: usize,
    pub max_buffered_records: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_requests: u64,
    pub window_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Ok(v) = env::var("PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Ok(v) = env::var("SERVER_MAX_BODY_BYTES") {
            self.server.max_body_bytes = v.parse().unwrap_or(self.server.max_body_bytes);
        }
        if let Ok(v) = env::var("SERVER_MAX_BATCH_EVENTS") {
            self.server.max_batch_events = v.parse().unwrap_or(self.server.max_batch_events);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_ACQUIRE_TIMEOUT_SECS") {
            self.database.acquire_timeout_secs = v.parse().unwrap_or(self.database.acquire_timeout_secs);
        }
        if let Ok(v) = env::var("DATABASE_QUERY_TIMEOUT_MS") {
            self.database.query_timeout_ms = v.parse().unwrap_or(self.database.query_timeout_ms);
        }

        // Cache overrides
        if let Ok(v) = env::var("REDIS_URL") {
            self.cache.redis_url = Some(v).filter(|url| !url.trim().is_empty());
        }
        if let Ok(v) = env::var("CACHE_OP_TIMEOUT_MS") {
            self.cache.op_timeout_ms = v.parse().unwrap_or(self.cache.op_timeout_ms);
        }
        if let Ok(v) = env::var("CACHE_KEY_TTL_SECS") {
            self.cache.key_ttl_secs = v.parse().unwrap_or(self.cache.key_ttl_secs);
        }
        if let Ok(v) = env::var("CACHE_NEGATIVE_TTL_SECS") {
            self.cache.negative_ttl_secs = v.parse().unwrap_or(self.cache.negative_ttl_secs);
        }

        // Analytics overrides
        if let Ok(v) = env::var("CLICKHOUSE_URL") {
            self.analytics.url = v;
        }
        if let Ok(v) = env::var("CLICKHOUSE_USER") {
            self.analytics.user = v;
        }
        if let Ok(v) = env::var("CLICKHOUSE_PASSWORD") {
            self.analytics.password = v;
        }
        if let Ok(v) = env::var("CLICKHOUSE_DATABASE") {
            self.analytics.database = v;
        }
        if let Ok(v) = env::var("CLICKHOUSE_INSERT_TIMEOUT_MS") {
            self.analytics.insert_timeout_ms = v.parse().unwrap_or(self.analytics.insert_timeout_ms);
        }
        if let Ok(v) = env::var("CLICKHOUSE_ASYNC_INSERT") {
            self.analytics.async_insert = v.parse().unwrap_or(self.analytics.async_insert);
        }

        // Buffer overrides
        if let Ok(v) = env::var("BUFFER_FLUSH_INTERVAL_MS") {
            self.buffer.flush_interval_ms = v.parse().unwrap_or(self.buffer.flush_interval_ms);
        }
        if let Ok(v) = env::var("BUFFER_MAX_BATCH_SIZE") {
            self.buffer.max_batch_size = v.parse().unwrap_or(self.buffer.max_batch_size);
        }
        if let Ok(v) = env::var("BUFFER_MAX_BUFFERED_RECORDS") {
            self.buffer.max_buffered_records = v.parse().unwrap_or(self.buffer.max_buffered_records);
        }

        // Rate limit overrides
        if let Ok(v) = env::var("RATE_LIMIT_ENABLED") {
            self.rate_limit.enabled = v.parse().unwrap_or(self.rate_limit.enabled);
        }
        if let Ok(v) = env::var("RATE_LIMIT_MAX_REQUESTS") {
            self.rate_limit.max_requests = v.parse().unwrap_or(self.rate_limit.max_requests);
        }
        if let Ok(v) = env::var("RATE_LIMIT_WINDOW_SECS") {
            self.rate_limit.window_secs = v.parse().unwrap_or(self.rate_limit.window_secs);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 4001,
                max_body_bytes: 1024 * 1024, // 1MB
                max_batch_events: 100,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 5,
                acquire_timeout_secs: 5,
                query_timeout_ms: 2000,
            },
            cache: CacheConfig {
                redis_url: None,
                op_timeout_ms: 250,
                key_ttl_secs: 300,
                negative_ttl_secs: 60,
            },
            analytics: AnalyticsConfig {
                url: "http://localhost:8123".to_string(),
                user: "default".to_string(),
                password: String::new(),
                database: "mctrack".to_string(),
                insert_timeout_ms: 30_000,
                async_insert: true,
            },
            buffer: BufferConfig {
                flush_interval_ms: 1000,
                max_batch_size: 1000,
                max_buffered_records: 100_000,
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                max_requests: 1000,
                window_secs: 60,
            },
        }
    }

    fn staging() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Staging;
        config.database.max_connections = 10;
        config
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                port: 4001,
                max_body_bytes: 1024 * 1024, // 1MB
                max_batch_events: 100,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                acquire_timeout_secs: 2,
                query_timeout_ms: 1000,
            },
            cache: CacheConfig {
                redis_url: None,
                op_timeout_ms: 100,
                key_ttl_secs: 300,
                negative_ttl_secs: 60,
            },
            analytics: AnalyticsConfig {
                url: "http://localhost:8123".to_string(),
                user: "default".to_string(),
                password: String::new(),
                database: "mctrack".to_string(),
                insert_timeout_ms: 30_000,
                async_insert: true,
            },
            buffer: BufferConfig {
                flush_interval_ms: 1000,
                max_batch_size: 1000,
                max_buffered_records: 250_000,
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                max_requests: 1000,
                window_secs: 60,
            },
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("BUFFER_MAX_BUFFERED_RECORDS ({ceiling}) must be at least BUFFER_MAX_BATCH_SIZE ({batch})")]
    CeilingBelowBatch { ceiling: usize, batch: usize },
}

impl AppConfig {
    /// Reject settings that would make the service spin or refuse every event
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("SERVER_MAX_BATCH_EVENTS", self.server.max_batch_events as u64),
            ("BUFFER_FLUSH_INTERVAL_MS", self.buffer.flush_interval_ms),
            ("BUFFER_MAX_BATCH_SIZE", self.buffer.max_batch_size as u64),
            ("CLICKHOUSE_INSERT_TIMEOUT_MS", self.analytics.insert_timeout_ms),
            ("CACHE_OP_TIMEOUT_MS", self.cache.op_timeout_ms),
            ("RATE_LIMIT_WINDOW_SECS", self.rate_limit.window_secs),
        ];
        if let Some((field, _)) = nonzero.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero(*field));
        }

        if self.buffer.max_buffered_records < self.buffer.max_batch_size {
            return Err(ConfigError::CeilingBelowBatch {
                ceiling: self.buffer.max_buffered_records,
                batch: self.buffer.max_batch_size,
            });
        }
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

impl CacheConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

impl AnalyticsConfig {
    pub fn insert_timeout(&self) -> Duration {
        Duration::from_millis(self.insert_timeout_ms)
    }
}

impl BufferConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
