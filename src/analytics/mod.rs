// Columnar analytics store: bulk inserts of normalized records

pub mod clickhouse;
pub mod schema;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub use clickhouse::ClickHouseStore;
pub use schema::{GAMEMODE_SESSIONS_TABLE, NETWORK_SESSIONS_TABLE};

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Analytics store request failed: {0}")]
    Transport(String),

    #[error("Analytics store rejected insert into {table} ({status}): {message}")]
    Rejected {
        table: String,
        status: u16,
        message: String,
    },

    #[error("Analytics insert timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to encode rows: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Invalid analytics store configuration: {0}")]
    Config(String),
}

/// Bulk-insert sink keyed by table name
///
/// A batch is accepted or rejected as a whole from the caller's point of view.
/// Callers retry rejected batches, so the target tables must tolerate duplicates.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn bulk_insert(&self, table: &str, rows: &[Value]) -> Result<(), AnalyticsError>;
}
