use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{AnalyticsError, AnalyticsStore};
use crate::config::AnalyticsConfig;

/// ClickHouse over its HTTP interface, rows encoded as `JSONEachRow`
#[derive(Clone)]
pub struct ClickHouseStore {
    client: Client,
    url: Url,
    user: String,
    password: String,
    database: String,
    async_insert: bool,
    timeout: Duration,
}

impl ClickHouseStore {
    pub fn new(config: &AnalyticsConfig) -> Result<Self, AnalyticsError> {
        let url = Url::parse(&config.url).map_err(|e| AnalyticsError::Config(e.to_string()))?;
        let client = Client::builder()
            .timeout(config.insert_timeout())
            .gzip(true)
            .build()
            .map_err(|e| AnalyticsError::Config(e.to_string()))?;

        Ok(Self {
            client,
            url,
            user: config.user.clone(),
            password: config.password.clone(),
            database: config.database.clone(),
            async_insert: config.async_insert,
            timeout: config.insert_timeout(),
        })
    }

    /// Run a statement that returns no rows (DDL)
    pub async fn execute(&self, sql: &str) -> Result<(), AnalyticsError> {
        let response = self
            .client
            .post(self.url.clone())
            .basic_auth(&self.user, Some(&self.password))
            .query(&[("database", self.database.as_str())])
            .body(sql.to_string())
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        check(response, "ddl").await
    }

    /// Create the configured database; runs without a database context since it may not exist yet
    pub async fn create_database(&self) -> Result<(), AnalyticsError> {
        let sql = format!("CREATE DATABASE IF NOT EXISTS `{}`", self.database.replace('`', ""));
        let response = self
            .client
            .post(self.url.clone())
            .basic_auth(&self.user, Some(&self.password))
            .body(sql)
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        check(response, "ddl").await
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    fn transport(&self, err: reqwest::Error) -> AnalyticsError {
        if err.is_timeout() {
            AnalyticsError::Timeout(self.timeout)
        } else {
            AnalyticsError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl AnalyticsStore for ClickHouseStore {
    async fn bulk_insert(&self, table: &str, rows: &[Value]) -> Result<(), AnalyticsError> {
        if rows.is_empty() {
            return Ok(());
        }

        let body = encode_rows(rows)?;
        let query = format!("INSERT INTO {} FORMAT JSONEachRow", table);

        let mut request = self
            .client
            .post(self.url.clone())
            .basic_auth(&self.user, Some(&self.password))
            .query(&[("database", self.database.as_str()), ("query", query.as_str())]);

        if self.async_insert {
            // Server-side batching, but still wait for the ack so failures are retried
            request = request.query(&[("async_insert", "1"), ("wait_for_async_insert", "1")]);
        }

        let response = request.body(body).send().await.map_err(|e| self.transport(e))?;
        check(response, table).await?;

        debug!("Inserted {} rows into {}", rows.len(), table);
        Ok(())
    }
}

fn encode_rows(rows: &[Value]) -> Result<Vec<u8>, AnalyticsError> {
    let mut body = Vec::with_capacity(rows.len() * 256);
    for row in rows {
        serde_json::to_writer(&mut body, row)?;
        body.push(b'\n');
    }
    Ok(body)
}

async fn check(response: reqwest::Response, table: &str) -> Result<(), AnalyticsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let message = response.text().await.unwrap_or_default();
    Err(AnalyticsError::Rejected {
        table: table.to_string(),
        status: status.as_u16(),
        message: message.trim().chars().take(512).collect(),
    })
}
