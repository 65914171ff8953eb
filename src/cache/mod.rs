// Key-value cache contract used for API key caching and rate-limit counters

pub mod memory;
pub mod redis_cache;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache connection error: {0}")]
    Connection(String),

    #[error("Cache command failed: {0}")]
    Command(String),

    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Value at '{0}' is not an integer")]
    NotAnInteger(String),
}

/// Remote cache with atomic counters and per-key expiry
///
/// Implementations must be safe to share across request tasks.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key`, expiring after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Atomically increment the integer at `key`, creating it at 1 when absent.
    /// An existing expiry is preserved.
    async fn increment(&self, key: &str) -> Result<i64, CacheError>;

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Remaining lifetime of `key`; `None` when the key is missing or has no expiry
    async fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}
