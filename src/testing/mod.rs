use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

use crate::analytics::{AnalyticsError, AnalyticsStore};
use crate::events::{GameModeSessionRecord, NetworkSessionRecord, Platform, StoreTimestamp};

/// Analytics store double with injectable failures and an optional hold gate
///
/// A held store parks every insert until [`ScriptedStore::release`] hands out
/// a permit, which lets tests append while a flush is in flight.
#[derive(Default)]
pub struct ScriptedStore {
    written: Mutex<HashMap<String, Vec<Value>>>,
    attempts: Mutex<HashMap<String, usize>>,
    failures_remaining: AtomicUsize,
    gate: Option<Semaphore>,
    started: Notify,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn held() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn fail_times(self, times: usize) -> Self {
        self.failures_remaining.store(times, Ordering::SeqCst);
        self
    }

    pub fn release(&self, inserts: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(inserts);
        }
    }

    /// Resolves once an insert has reached the store
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    pub fn attempts(&self) -> usize {
        self.attempts.lock().values().sum()
    }

    pub fn attempts_for(&self, table: &str) -> usize {
        self.attempts.lock().get(table).copied().unwrap_or(0)
    }

    /// Rows from successful inserts, in insert order
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.written.lock().get(table).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl AnalyticsStore for ScriptedStore {
    async fn bulk_insert(&self, table: &str, rows: &[Value]) -> Result<(), AnalyticsError> {
        *self.attempts.lock().entry(table.to_string()).or_default() += 1;
        self.started.notify_one();

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AnalyticsError::Transport("injected failure".to_string()));
        }

        self.written
            .lock()
            .entry(table.to_string())
            .or_default()
            .extend_from_slice(rows);
        Ok(())
    }
}

pub fn session_record(session_uuid: Uuid) -> NetworkSessionRecord {
    let now = StoreTimestamp::new(chrono::Utc::now());
    NetworkSessionRecord {
        network_id: Uuid::nil(),
        session_uuid,
        player_uuid: Uuid::new_v4().simple().to_string(),
        domain: "play.example.net".to_string(),
        ip_address: "203.0.113.7".to_string(),
        platform: Platform::Java,
        bedrock_device: None,
        start_time: now,
        end_time: None,
        last_heartbeat: now,
    }
}

pub fn gamemode_record(session_uuid: Uuid) -> GameModeSessionRecord {
    GameModeSessionRecord {
        gamemode_id: Uuid::nil(),
        session_uuid,
        player_uuid: Uuid::new_v4().simple().to_string(),
        server_name: Some("bedwars-1".to_string()),
        start_time: StoreTimestamp::new(chrono::Utc::now()),
        end_time: None,
    }
}
