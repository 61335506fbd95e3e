//! Periodic timestamp records
//!
//! Every interval the appender writes one `timestamp: <RFC 2822 time>\n`
//! record into the store, competing for the lock like any connection. The
//! first record appears one full interval after start.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use aesd_core::SharedStore;

use crate::backing::BackingFile;
use crate::error::ServerResult;

/// strftime pattern for the time portion of a record
pub const TIMESTAMP_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Leading text of every timestamp record
pub const TIMESTAMP_PREFIX: &str = "timestamp: ";

/// Render one terminated timestamp record
pub fn format_timestamp<Tz>(time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("{TIMESTAMP_PREFIX}{}\n", time.format(TIMESTAMP_FORMAT))
}

/// Background producer of timestamp records
pub struct TimestampAppender {
    store: SharedStore,
    interval: Duration,
    mirror: Option<Arc<BackingFile>>,
}

impl TimestampAppender {
    pub fn new(store: SharedStore, interval: Duration, mirror: Option<Arc<BackingFile>>) -> Self {
        Self {
            store,
            interval,
            mirror,
        }
    }

    /// Start the timer task; it runs until `shutdown_rx` fires
    pub fn spawn(self, shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown_rx))
    }

    async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs_f64(),
            "Timestamp task started"
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Timestamp task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "Skipped timestamp record");
                    }
                }
            }
        }
    }

    /// Append one timestamp record for the current local time
    ///
    /// Returns whether the oldest record was evicted.
    pub async fn tick(&self) -> ServerResult<bool> {
        let record = format_timestamp(&Local::now());

        let mut store = self.store.lock().await?;
        let evicted = store.append(record.clone());
        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.append(record.as_bytes()).await {
                warn!(error = %e, "Failed to mirror timestamp to backing file");
            }
        }
        drop(store);

        debug!(record = record.trim_end(), evicted, "Appended timestamp");
        Ok(evicted)
    }
}
