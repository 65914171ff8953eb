// Periodic flush timer and shutdown drain for the write buffer

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::buffer::{FlushOutcome, FlushReport, WriteBuffer};

/// Owns the flush timer task
///
/// `start` is idempotent. `stop` halts the timer without cancelling a flush
/// that is already running, then drains the buffer one final time.
pub struct Lifecycle {
    buffer: Arc<WriteBuffer>,
    interval: Duration,
    shutdown: Arc<Notify>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Lifecycle {
    pub fn new(buffer: Arc<WriteBuffer>, interval: Duration) -> Self {
        Self {
            buffer,
            interval,
            shutdown: Arc::new(Notify::new()),
            timer: Mutex::new(None),
        }
    }

    pub fn start(&self) {
        let mut timer = self.timer.lock();
        if timer.is_some() {
            return;
        }

        let buffer = self.buffer.clone();
        let shutdown = self.shutdown.clone();
        let period = self.interval;

        *timer = Some(tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.notified() => break,
                    _ = ticks.tick() => {
                        if let FlushOutcome::Completed(report) = buffer.flush().await {
                            tracing::trace!("Interval flush finished: {:?}", report);
                        }
                    }
                }
            }
        }));

        info!("Write buffer flush timer started ({:?} interval)", self.interval);
    }

    pub fn is_running(&self) -> bool {
        self.timer.lock().is_some()
    }

    /// Stop the timer and perform the final drain; safe to call without `start`
    pub async fn stop(&self) -> FlushReport {
        let timer = self.timer.lock().take();
        if let Some(timer) = timer {
            self.shutdown.notify_one();
            if let Err(e) = timer.await {
                error!("Flush timer task ended abnormally: {}", e);
            }
        }

        let report = self.buffer.drain().await;
        let pending = self.buffer.len();
        if pending > 0 {
            error!("Shutdown drain left {} records unwritten", pending);
        } else {
            info!("Write buffer drained on shutdown: {:?}", report);
        }
        report
    }
}
