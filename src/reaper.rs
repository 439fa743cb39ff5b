use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::{now_ms, Engine};
use crate::model::{Ms, ReservationStatus};

/// Background task that keeps reservation statuses in step with the clock
/// and purges terminal reservations past the retention window.
pub async fn run_sweeper(engine: Arc<Engine>, retention_ms: Ms) {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    loop {
        interval.tick().await;
        let now = now_ms();

        for (id, target) in engine.collect_due_rollovers(now) {
            let result = match target {
                ReservationStatus::Ongoing => engine.mark_started(id).await,
                ReservationStatus::Completed => engine.mark_completed(id).await,
                _ => Ok(()),
            };
            match result {
                Ok(()) => info!("rolled reservation {id} to {}", target.as_str()),
                Err(e) => {
                    // May have been cancelled since the sweep — that's fine
                    tracing::debug!("sweeper skip {id}: {e}");
                }
            }
        }

        for id in engine.collect_expired_retention(now, retention_ms) {
            match engine.purge_reservation(id).await {
                Ok(()) => info!("purged expired reservation {id}"),
                Err(e) => tracing::debug!("sweeper purge skip {id}: {e}"),
            }
        }
    }
}

/// Background task that compacts the WAL once enough appends accumulate.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends >= threshold {
            match engine.compact_wal().await {
                Ok(()) => info!("compacted WAL after {appends} appends"),
                Err(e) => tracing::warn!("WAL compaction failed: {e}"),
            }
        }
    }
}
