use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::KeyValueCache;
use crate::config::CacheConfig;
use crate::database::KeyStore;
use crate::types::ApiKeyIdentity;

/// Every issued key starts with this prefix
pub const API_KEY_PREFIX: &str = "mct_";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("API key required")]
    MissingKey,

    #[error("Invalid API key format")]
    InvalidFormat,

    #[error("Invalid API key")]
    InvalidKey,

    #[error("API key revoked or unknown")]
    RevokedOrUnknown,

    #[error("Key lookup unavailable: {0}")]
    Unavailable(String),
}

/// Cached form of a key lookup, positive or negative
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    network_id: Option<Uuid>,
    #[serde(default)]
    gamemode_id: Option<Uuid>,
    revoked: bool,
}

impl CachedKey {
    fn negative() -> Self {
        Self {
            id: None,
            network_id: None,
            gamemode_id: None,
            revoked: true,
        }
    }

    fn identity(&self) -> Option<ApiKeyIdentity> {
        if self.revoked {
            return None;
        }
        Some(ApiKeyIdentity::new(self.id?, self.network_id?, self.gamemode_id))
    }
}

impl From<&ApiKeyIdentity> for CachedKey {
    fn from(identity: &ApiKeyIdentity) -> Self {
        Self {
            id: Some(identity.key_id),
            network_id: Some(identity.network_id),
            gamemode_id: identity.gamemode_id,
            revoked: false,
        }
    }
}

/// TTLs and timeouts for key resolution
#[derive(Debug, Clone)]
pub struct KeyAuthorityConfig {
    pub positive_ttl: Duration,
    pub negative_ttl: Duration,
    pub cache_timeout: Duration,
}

impl Default for KeyAuthorityConfig {
    fn default() -> Self {
        Self {
            positive_ttl: Duration::from_secs(300),
            negative_ttl: Duration::from_secs(60),
            cache_timeout: Duration::from_millis(250),
        }
    }
}

impl From<&CacheConfig> for KeyAuthorityConfig {
    fn from(config: &CacheConfig) -> Self {
        Self {
            positive_ttl: Duration::from_secs(config.key_ttl_secs),
            negative_ttl: Duration::from_secs(config.negative_ttl_secs),
            cache_timeout: config.op_timeout(),
        }
    }
}

/// SHA-256 hex digest of a plaintext key, matching `api_keys.key_hash`
pub fn hash_api_key(plaintext: &str) -> String {
    format!("{:x}", Sha256::digest(plaintext.as_bytes()))
}

/// Resolves API keys to tenant identities through a positive/negative cache
///
/// Cache failures degrade to a relational lookup. Relational failures fail
/// closed: no identity is ever granted without a successful lookup or a
/// positive cache entry.
pub struct KeyAuthority {
    cache: Arc<dyn KeyValueCache>,
    store: Arc<dyn KeyStore>,
    config: KeyAuthorityConfig,
}

impl KeyAuthority {
    pub fn new(cache: Arc<dyn KeyValueCache>, store: Arc<dyn KeyStore>, config: KeyAuthorityConfig) -> Self {
        Self { cache, store, config }
    }

    pub async fn resolve(&self, plaintext: &str) -> Result<ApiKeyIdentity, AuthError> {
        if plaintext.is_empty() {
            return Err(AuthError::MissingKey);
        }
        if !plaintext.starts_with(API_KEY_PREFIX) || plaintext.len() == API_KEY_PREFIX.len() {
            return Err(AuthError::InvalidFormat);
        }

        let key_hash = hash_api_key(plaintext);
        let cache_key = format!("apikey:{}", key_hash);

        // Check cache first
        if let Some(cached) = self.cached(&cache_key).await {
            return match cached.identity() {
                Some(identity) => Ok(identity),
                None => Err(AuthError::RevokedOrUnknown),
            };
        }

        // Look up in database
        let found = self.store.find_active_key(&key_hash).await.map_err(|e| {
            warn!("API key lookup failed: {}", e);
            AuthError::Unavailable(e.to_string())
        })?;

        let identity = match found {
            Some(identity) if !identity.revoked => identity,
            _ => {
                // Cache negative result briefly
                self.store_cached(&cache_key, &CachedKey::negative(), self.config.negative_ttl).await;
                debug!("Rejected unknown API key {}", &key_hash[..12]);
                return Err(AuthError::InvalidKey);
            }
        };

        self.store_cached(&cache_key, &CachedKey::from(&identity), self.config.positive_ttl).await;

        // Update last used (detached, failures ignored)
        let store = self.store.clone();
        let key_id = identity.key_id;
        tokio::spawn(async move {
            if let Err(e) = store.touch_last_used(key_id).await {
                debug!("Failed to update last_used_at for key {}: {}", key_id, e);
            }
        });

        Ok(identity)
    }

    async fn cached(&self, cache_key: &str) -> Option<CachedKey> {
        let raw = match tokio::time::timeout(self.config.cache_timeout, self.cache.get(cache_key)).await {
            Ok(Ok(raw)) => raw?,
            Ok(Err(e)) => {
                warn!("API key cache read failed, falling back to database: {}", e);
                return None;
            }
            Err(_) => {
                warn!("API key cache read timed out, falling back to database");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(cached) => Some(cached),
            Err(e) => {
                warn!("Discarding unreadable API key cache entry: {}", e);
                None
            }
        }
    }

    async fn store_cached(&self, cache_key: &str, value: &CachedKey, ttl: Duration) {
        let Ok(raw) = serde_json::to_string(value) else {
            return;
        };
        match tokio::time::timeout(self.config.cache_timeout, self.cache.set(cache_key, &raw, ttl)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("API key cache write failed: {}", e),
            Err(_) => warn!("API key cache write timed out"),
        }
    }
}
