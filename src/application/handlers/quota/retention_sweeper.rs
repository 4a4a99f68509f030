//! RetentionSweeper - periodic age-based purge of the usage ledger.
//!
//! Runs off the hot path. Blocked rows are kept, since deleting them would
//! silently unblock the identity.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::domain::quota::QuotaError;
use crate::ports::{Clock, UsageLedger};

use super::ledger_call::unavailable;

/// Periodic purge of old ledger rows.
pub struct RetentionSweeper {
    ledger: Arc<dyn UsageLedger>,
    clock: Arc<dyn Clock>,
    retention_days: i64,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(
        ledger: Arc<dyn UsageLedger>,
        clock: Arc<dyn Clock>,
        retention_days: i64,
        interval: Duration,
    ) -> Self {
        Self {
            ledger,
            clock,
            retention_days,
            interval,
        }
    }

    /// Purges rows created more than `retention_days` ago. Returns the count.
    pub async fn sweep_once(&self) -> Result<u64, QuotaError> {
        let cutoff = self.clock.now().minus_days(self.retention_days);
        let purged = self
            .ledger
            .purge_older_than(cutoff)
            .await
            .map_err(|e| unavailable("purge usage records", e))?;

        tracing::info!(purged, cutoff = %cutoff, "retention sweep finished");
        Ok(purged)
    }

    /// Sweeps every `interval` until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // failures are already logged; the next tick retries
                    let _ = self.sweep_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("retention sweeper stopping");
                        break;
                    }
                }
            }
        }
    }
}
