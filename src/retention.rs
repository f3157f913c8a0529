//! Background removal of expired uploads and artifacts.
//!
//! Off unless `retention_secs` is configured. When on, a single task sweeps
//! the upload directory every `sweep_interval_secs` and deletes files whose
//! modification time is older than the retention period.

use crate::storage::UploadStore;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Spawn the sweeper. Abort the returned handle to stop it.
pub fn spawn_sweeper(store: UploadStore, max_age: Duration, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(
            "Retention sweeper started: max age {}s, every {}s",
            max_age.as_secs(),
            every.as_secs()
        );

        loop {
            ticker.tick().await;
            match store.sweep(max_age).await {
                Ok(report) if report.failed > 0 => {
                    warn!("Sweep left {} expired files in place", report.failed);
                }
                Ok(_) => {}
                Err(e) => warn!("Sweep failed: {}", e),
            }
        }
    })
}
