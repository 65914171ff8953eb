use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::cache::{CacheError, KeyValueCache};
use crate::config::RateLimitConfig;

/// Independent quota namespaces; counters never collide across scopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitScope {
    /// Game servers, keyed by API key digest
    Ingestion,
    /// Dashboard API, keyed by user id or client IP
    Api,
}

impl RateLimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitScope::Ingestion => "ingestion",
            RateLimitScope::Api => "api",
        }
    }
}

/// Outcome of an admission check, including values for the rate-limit headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
    /// False when the cache was unavailable and the request was let through uncounted
    pub counted: bool,
}

impl RateLimitDecision {
    pub fn reset_at_millis(&self) -> i64 {
        self.reset_at.timestamp_millis()
    }
}

/// Fixed-window request counter backed by the shared cache
///
/// The first increment in a window arms its expiry. Increments past the limit
/// are not rolled back, so `remaining` stays pinned at zero until the window
/// expires. If the cache is unreachable the check fails open.
pub struct RateLimiter {
    cache: Arc<dyn KeyValueCache>,
    scope: RateLimitScope,
    max_requests: u64,
    window: Duration,
    timeout: Duration,
}

impl RateLimiter {
    pub fn new(
        cache: Arc<dyn KeyValueCache>,
        scope: RateLimitScope,
        max_requests: u64,
        window: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            cache,
            scope,
            max_requests,
            window,
            timeout,
        }
    }

    pub fn from_config(
        cache: Arc<dyn KeyValueCache>,
        scope: RateLimitScope,
        config: &RateLimitConfig,
        timeout: Duration,
    ) -> Self {
        Self::new(cache, scope, config.max_requests, config.window(), timeout)
    }

    pub async fn check(&self, identifier: &str) -> RateLimitDecision {
        let key = format!("ratelimit:{}:{}", self.scope.as_str(), identifier);

        match self.count(&key).await {
            Ok((count, ttl)) => {
                let count = count.max(0) as u64;
                RateLimitDecision {
                    allowed: count <= self.max_requests,
                    limit: self.max_requests,
                    remaining: self.max_requests.saturating_sub(count),
                    reset_at: reset_at(ttl),
                    counted: true,
                }
            }
            Err(e) => {
                // If the cache fails, allow the request through
                warn!("Rate limiter unavailable for scope {}: {}", self.scope.as_str(), e);
                RateLimitDecision {
                    allowed: true,
                    limit: self.max_requests,
                    remaining: self.max_requests,
                    reset_at: reset_at(self.window),
                    counted: false,
                }
            }
        }
    }

    async fn count(&self, key: &str) -> Result<(i64, Duration), CacheError> {
        let current = self.bounded(self.cache.increment(key)).await?;

        if current == 1 {
            self.bounded(self.cache.set_expiry(key, self.window)).await?;
            return Ok((current, self.window));
        }

        let ttl = match self.bounded(self.cache.ttl_remaining(key)).await? {
            Some(ttl) => ttl,
            None => {
                // Counter lost its expiry (e.g. crash between INCR and PEXPIRE); re-arm it
                self.bounded(self.cache.set_expiry(key, self.window)).await?;
                self.window
            }
        };

        Ok((current, ttl))
    }

    async fn bounded<T>(
        &self,
        op: impl std::future::Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| CacheError::Timeout(self.timeout))?
    }
}

fn reset_at(ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
    Utc::now() + ttl
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use async_trait::async_trait;

    fn limiter(cache: Arc<dyn KeyValueCache>, scope: RateLimitScope, max: u64) -> RateLimiter {
        RateLimiter::new(cache, scope, max, Duration::from_secs(60), Duration::from_millis(100))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_window_quota() {
        let limiter = limiter(Arc::new(MemoryCache::new()), RateLimitScope::Ingestion, 1000);

        let mut previous = u64::MAX;
        for _ in 0..1000 {
            let decision = limiter.check("key-digest").await;
            assert!(decision.allowed);
            assert!(decision.remaining < previous, "remaining must strictly decrease");
            previous = decision.remaining;
        }
        assert_eq!(previous, 0);

        let rejected = limiter.check("key-digest").await;
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        assert_eq!(rejected.limit, 1000);

        // Still rejected and still pinned at zero
        let again = limiter.check("key-digest").await;
        assert!(!again.allowed);
        assert_eq!(again.remaining, 0);

        tokio::time::advance(Duration::from_secs(61)).await;
        let fresh = limiter.check("key-digest").await;
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 999);
    }

    #[tokio::test]
    async fn test_scopes_do_not_share_counters() {
        let cache: Arc<dyn KeyValueCache> = Arc::new(MemoryCache::new());
        let ingestion = limiter(cache.clone(), RateLimitScope::Ingestion, 1);
        let api = limiter(cache, RateLimitScope::Api, 1);

        assert!(ingestion.check("same-id").await.allowed);
        assert!(!ingestion.check("same-id").await.allowed);
        assert!(api.check("same-id").await.allowed);
    }

    #[tokio::test]
    async fn test_counter_without_expiry_is_rearmed() {
        let cache = Arc::new(MemoryCache::new());
        cache.increment("ratelimit:ingestion:orphan").await.unwrap();

        let limiter = limiter(cache.clone(), RateLimitScope::Ingestion, 10);
        let decision = limiter.check("orphan").await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 8);
        assert!(cache.ttl_remaining("ratelimit:ingestion:orphan").await.unwrap().is_some());
    }

    struct HangingCache;

    #[async_trait]
    impl KeyValueCache for HangingCache {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            std::future::pending().await
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
            std::future::pending().await
        }
        async fn increment(&self, _key: &str) -> Result<i64, CacheError> {
            std::future::pending().await
        }
        async fn set_expiry(&self, _key: &str, _ttl: Duration) -> Result<(), CacheError> {
            std::future::pending().await
        }
        async fn ttl_remaining(&self, _key: &str) -> Result<Option<Duration>, CacheError> {
            std::future::pending().await
        }
        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_cache_fails_open() {
        let limiter = limiter(Arc::new(HangingCache), RateLimitScope::Ingestion, 1);

        for _ in 0..3 {
            let decision = limiter.check("key-digest").await;
            assert!(decision.allowed);
            assert!(!decision.counted);
            assert_eq!(decision.remaining, 1);
        }
    }
}
