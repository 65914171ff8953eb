//! Write buffer and flush engine
//!
//! Normalized records are staged in memory, one FIFO queue per record kind,
//! and drained into the analytics store by [`WriteBuffer::flush`]. A flush is
//! triggered when a queue reaches `max_batch_size` (fire-and-forget from
//! `append`), by the periodic timer, and once more on shutdown.
//!
//! At most one flush runs at a time. A trigger arriving while a flush is in
//! flight is dropped; the condition that caused it is re-evaluated at the next
//! trigger. Records swapped out for a flush are put back at the head of their
//! queue if the insert fails, times out, or the flush is cancelled, so every
//! accepted record is either written or still resident in memory.
//!
//! Accepting a record means "buffered in memory", not "committed": a process
//! crash loses whatever has not been flushed yet.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::analytics::{AnalyticsError, AnalyticsStore, GAMEMODE_SESSIONS_TABLE, NETWORK_SESSIONS_TABLE};
use crate::config::{AnalyticsConfig, BufferConfig};
use crate::events::{GameModeSessionRecord, NetworkSessionRecord, Record};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("{table} buffer is full ({limit} records pending)")]
    Full { table: &'static str, limit: usize },
}

#[derive(Debug, Clone)]
pub struct WriteBufferConfig {
    /// Queue length that triggers an immediate flush
    pub max_batch_size: usize,
    /// Hard ceiling per queue; appends beyond it are refused
    pub max_buffered_records: usize,
    pub insert_timeout: Duration,
}

impl Default for WriteBufferConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 1000,
            max_buffered_records: 100_000,
            insert_timeout: Duration::from_secs(30),
        }
    }
}

impl WriteBufferConfig {
    pub fn from_config(buffer: &BufferConfig, analytics: &AnalyticsConfig) -> Self {
        Self {
            max_batch_size: buffer.max_batch_size.max(1),
            max_buffered_records: buffer.max_buffered_records.max(buffer.max_batch_size),
            insert_timeout: analytics.insert_timeout(),
        }
    }
}

/// What happened to one queue during a flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueFlush {
    Empty,
    Written(usize),
    Requeued(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub sessions: QueueFlush,
    pub gamemode_sessions: QueueFlush,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Another flush was already in flight
    Skipped,
    Completed(FlushReport),
}

/// Snapshot for the stats endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferStats {
    pub sessions: usize,
    pub gamemode_sessions: usize,
    pub last_flush_at: DateTime<Utc>,
    pub ms_since_last_flush: i64,
    pub flushing: bool,
    pub failed_flushes: u64,
}

struct Queue<T> {
    table: &'static str,
    records: Mutex<Vec<T>>,
}

impl<T> Queue<T> {
    fn new(table: &'static str) -> Self {
        Self {
            table,
            records: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, record: T, limit: usize) -> Result<usize, BufferError> {
        let mut records = self.records.lock();
        if records.len() >= limit {
            return Err(BufferError::Full {
                table: self.table,
                limit,
            });
        }
        records.push(record);
        Ok(records.len())
    }

    fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Swap the live queue for an empty one
    fn capture(&self) -> Captured<'_, T> {
        let records = std::mem::take(&mut *self.records.lock());
        Captured { queue: self, records }
    }

    /// Put an older epoch back ahead of anything appended since it was captured
    fn restore(&self, mut older: Vec<T>) -> usize {
        let mut records = self.records.lock();
        older.append(&mut records);
        *records = older;
        records.len()
    }
}

/// Records swapped out for a flush; returned to the queue unless committed
struct Captured<'a, T> {
    queue: &'a Queue<T>,
    records: Vec<T>,
}

impl<T> Captured<'_, T> {
    fn commit(mut self) {
        self.records.clear();
    }

    fn requeue(mut self) -> usize {
        let records = std::mem::take(&mut self.records);
        self.queue.restore(records)
    }
}

impl<T> Drop for Captured<'_, T> {
    fn drop(&mut self) {
        // Flush future cancelled mid-insert
        if !self.records.is_empty() {
            self.queue.restore(std::mem::take(&mut self.records));
        }
    }
}

/// Per-kind in-memory staging with dual-trigger flushing into the analytics store
pub struct WriteBuffer {
    sessions: Queue<NetworkSessionRecord>,
    gamemode_sessions: Queue<GameModeSessionRecord>,
    store: Arc<dyn AnalyticsStore>,
    config: WriteBufferConfig,
    flush_gate: tokio::sync::Mutex<()>,
    flushing: AtomicBool,
    last_flush_at: Mutex<DateTime<Utc>>,
    failed_flushes: AtomicU64,
}

impl WriteBuffer {
    pub fn new(store: Arc<dyn AnalyticsStore>, config: WriteBufferConfig) -> Arc<Self> {
        Arc::new(Self {
            sessions: Queue::new(NETWORK_SESSIONS_TABLE),
            gamemode_sessions: Queue::new(GAMEMODE_SESSIONS_TABLE),
            store,
            config,
            flush_gate: tokio::sync::Mutex::new(()),
            flushing: AtomicBool::new(false),
            last_flush_at: Mutex::new(Utc::now()),
            failed_flushes: AtomicU64::new(0),
        })
    }

    /// Stage a record; never waits on the analytics store
    ///
    /// When the record's queue reaches `max_batch_size` a flush is spawned in
    /// the background and this call returns without waiting for it.
    pub fn append(self: &Arc<Self>, record: Record) -> Result<(), BufferError> {
        let limit = self.config.max_buffered_records;
        let len = match record {
            Record::Session(record) => self.sessions.push(record, limit)?,
            Record::GamemodeSession(record) => self.gamemode_sessions.push(record, limit)?,
        };

        if len >= self.config.max_batch_size && !self.is_flushing() {
            let buffer = Arc::clone(self);
            tokio::spawn(async move {
                if let FlushOutcome::Completed(report) = buffer.flush().await {
                    debug!("Size-triggered flush finished: {:?}", report);
                }
            });
        }

        Ok(())
    }

    /// Drain both queues unless a flush is already running (then this is a no-op)
    pub async fn flush(&self) -> FlushOutcome {
        let Ok(_guard) = self.flush_gate.try_lock() else {
            debug!("Flush already in progress, dropping trigger");
            return FlushOutcome::Skipped;
        };
        FlushOutcome::Completed(self.flush_locked().await)
    }

    /// Wait for any in-flight flush, then drain both queues once more
    pub async fn drain(&self) -> FlushReport {
        let _guard = self.flush_gate.lock().await;
        self.flush_locked().await
    }

    async fn flush_locked(&self) -> FlushReport {
        let _flushing = FlushingFlag::raise(&self.flushing);
        *self.last_flush_at.lock() = Utc::now();

        let sessions = self.flush_queue(&self.sessions).await;
        let gamemode_sessions = self.flush_queue(&self.gamemode_sessions).await;

        FlushReport {
            sessions,
            gamemode_sessions,
        }
    }

    async fn flush_queue<T: Serialize>(&self, queue: &Queue<T>) -> QueueFlush {
        let captured = queue.capture();
        if captured.records.is_empty() {
            return QueueFlush::Empty;
        }
        let count = captured.records.len();

        let result = self.insert(queue.table, &captured.records).await;
        match result {
            Ok(()) => {
                captured.commit();
                debug!("Flushed {} records to {}", count, queue.table);
                QueueFlush::Written(count)
            }
            Err(e) => {
                self.failed_flushes.fetch_add(1, Ordering::Relaxed);
                error!("Failed to flush {} records to {}: {}", count, queue.table, e);
                let depth = captured.requeue();
                warn!("Requeued {} records for {}, queue depth now {}", count, queue.table, depth);
                QueueFlush::Requeued(count)
            }
        }
    }

    async fn insert<T: Serialize>(&self, table: &'static str, records: &[T]) -> Result<(), AnalyticsError> {
        let rows = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()?;

        tokio::time::timeout(self.config.insert_timeout, self.store.bulk_insert(table, &rows))
            .await
            .map_err(|_| AnalyticsError::Timeout(self.config.insert_timeout))?
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.sessions.len() + self.gamemode_sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> BufferStats {
        let last_flush_at = *self.last_flush_at.lock();
        BufferStats {
            sessions: self.sessions.len(),
            gamemode_sessions: self.gamemode_sessions.len(),
            last_flush_at,
            ms_since_last_flush: (Utc::now() - last_flush_at).num_milliseconds().max(0),
            flushing: self.is_flushing(),
            failed_flushes: self.failed_flushes.load(Ordering::Relaxed),
        }
    }
}

struct FlushingFlag<'a>(&'a AtomicBool);

impl<'a> FlushingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for FlushingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
