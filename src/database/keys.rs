use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::types::ApiKeyIdentity;

/// Point lookups against the `api_keys` table
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Find an unrevoked key by its digest
    async fn find_active_key(&self, key_hash: &str) -> Result<Option<ApiKeyIdentity>, DatabaseError>;

    /// Record that a key was just used (observability only)
    async fn touch_last_used(&self, key_id: Uuid) -> Result<(), DatabaseError>;
}

pub struct PgKeyStore {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgKeyStore {
    pub fn new(pool: PgPool, query_timeout: Duration) -> Self {
        Self { pool, query_timeout }
    }
}

#[async_trait]
impl KeyStore for PgKeyStore {
    async fn find_active_key(&self, key_hash: &str) -> Result<Option<ApiKeyIdentity>, DatabaseError> {
        let query = r#"
            SELECT id, network_id, gamemode_id, revoked_at
            FROM api_keys
            WHERE key_hash = $1
            AND revoked_at IS NULL
            LIMIT 1
        "#;

        let row = tokio::time::timeout(
            self.query_timeout,
            sqlx::query(query).bind(key_hash).fetch_optional(&self.pool),
        )
        .await
        .map_err(|_| DatabaseError::Timeout(self.query_timeout))??;

        let Some(row) = row else {
            return Ok(None);
        };

        let revoked_at: Option<chrono::NaiveDateTime> = row.try_get("revoked_at")?;

        Ok(Some(ApiKeyIdentity {
            key_id: row.try_get("id")?,
            network_id: row.try_get("network_id")?,
            gamemode_id: row.try_get("gamemode_id")?,
            revoked: revoked_at.is_some(),
        }))
    }

    async fn touch_last_used(&self, key_id: Uuid) -> Result<(), DatabaseError> {
        tokio::time::timeout(
            self.query_timeout,
            sqlx::query("UPDATE api_keys SET last_used_at = now() WHERE id = $1")
                .bind(key_id)
                .execute(&self.pool),
        )
        .await
        .map_err(|_| DatabaseError::Timeout(self.query_timeout))??;

        Ok(())
    }
}
