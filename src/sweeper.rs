//! Background expiry of links past their `expires_at`
//!
//! Under the soft policy a sweep first marks expired links inactive and then
//! purges links that have been inactive longer than the grace period. Under
//! the hard policy expired links are deleted outright. Either way every batch
//! is its own short statement, and a sweep is safe to repeat.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info};

use crate::config::{RetentionPolicy, SweeperConfig};
use crate::storage::Storage;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Links newly marked inactive
    pub expired: u64,
    /// Links deleted together with their visits
    pub purged: u64,
}

pub struct Sweeper {
    storage: Arc<dyn Storage>,
    config: SweeperConfig,
}

impl Sweeper {
    pub fn new(storage: Arc<dyn Storage>, config: SweeperConfig) -> Self {
        Self { storage, config }
    }

    /// One full pass at the current time.
    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(chrono::Utc::now().timestamp()).await
    }

    pub async fn sweep_at(&self, now: i64) -> Result<SweepReport> {
        let limit = self.config.batch_size;
        let mut report = SweepReport::default();

        match self.config.policy {
            RetentionPolicy::Soft => {
                loop {
                    let codes = self.storage.expire_batch(now, limit).await?;
                    report.expired += codes.len() as u64;
                    if (codes.len() as i64) < limit {
                        break;
                    }
                }

                let cutoff = now - self.config.purge_after_secs;
                loop {
                    let codes = self.storage.purge_inactive_batch(cutoff, limit).await?;
                    report.purged += codes.len() as u64;
                    if (codes.len() as i64) < limit {
                        break;
                    }
                }
            }
            RetentionPolicy::Hard => loop {
                let codes = self.storage.purge_expired_batch(now, limit).await?;
                report.purged += codes.len() as u64;
                if (codes.len() as i64) < limit {
                    break;
                }
            },
        }

        if report != SweepReport::default() {
            info!(
                expired = report.expired,
                purged = report.purged,
                "Sweep finished"
            );
        } else {
            debug!("Sweep found nothing to do");
        }

        Ok(report)
    }

    /// Run `sweep` every interval until `shutdown` flips to `true`.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = time::interval(Duration::from_secs(self.config.interval_secs));
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        // Errors are retried on the next tick
                        if let Err(e) = self.sweep().await {
                            error!("Sweep failed: {e:#}");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Sweeper shutting down");
                            break;
                        }
                    }
                }
            }
        })
    }
}
