//! Periodic retention sweep over persisted alarms.
//!
//! Read alarms are kept for a window measured from their read date, unread
//! alarms for a longer window measured from creation. The sweep runs on a
//! fixed interval and deletes whatever fell outside either window.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::RetentionConfig;
use crate::error::AppResult;
use crate::store::AlarmStore;

pub struct RetentionScheduler {
    alarms: Arc<dyn AlarmStore>,
    read_retention: chrono::Duration,
    unread_retention: chrono::Duration,
    period: Duration,
}

impl RetentionScheduler {
    pub fn new(alarms: Arc<dyn AlarmStore>, config: &RetentionConfig) -> Self {
        Self {
            alarms,
            read_retention: chrono::Duration::days(config.read_retention_days),
            unread_retention: chrono::Duration::days(config.unread_retention_days),
            period: Duration::from_secs(config.sweep_interval_secs),
        }
    }

    /// Run one sweep at `now`. Returns (read deleted, unread deleted).
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> AppResult<(u64, u64)> {
        let read = self
            .alarms
            .delete_read_before(now - self.read_retention)
            .await?;
        let unread = self
            .alarms
            .delete_unread_before(now - self.unread_retention)
            .await?;
        Ok((read, unread))
    }

    /// Spawn the sweep loop. A failed sweep is logged and retried on the
    /// next tick.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick fires immediately; sweep on startup is harmless.
            loop {
                interval.tick().await;
                match self.sweep_once(Utc::now()).await {
                    Ok((read, unread)) => {
                        info!(read, unread, "retention sweep completed");
                    }
                    Err(e) => {
                        error!("retention sweep failed: {e}");
                    }
                }
            }
        })
    }
}
