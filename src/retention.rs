use anyhow::Result;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::America::Sao_Paulo;
use std::sync::Arc;
use tracing::{error, info};

use crate::metrics;
use crate::store::{DocumentStore, MAX_BATCH_SIZE, NOTIFICATIONS};

/// Deletes notification records older than the retention window. Runs daily
/// at 02:00 America/Sao_Paulo; a failed run is logged and left for the next
/// tick to catch up.
pub struct RetentionSweeper {
    store: Arc<dyn DocumentStore>,
    retention_days: i64,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn DocumentStore>, retention_days: i64) -> Self {
        Self {
            store,
            retention_days,
        }
    }

    /// Removes records strictly older than `now - retention_days`. A record
    /// exactly at the boundary survives. The candidate set is deleted in
    /// store-limit-sized batches so a large backlog cannot overflow a single
    /// batch.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - Duration::days(self.retention_days);
        let ids = self.store.find_notifications_before(cutoff).await?;

        if ids.is_empty() {
            info!("Retention sweep found no expired notifications");
            return Ok(0);
        }

        let mut deleted = 0;
        for chunk in ids.chunks(MAX_BATCH_SIZE) {
            deleted += self.store.delete_batch(NOTIFICATIONS, chunk).await?;
        }

        metrics::DOCUMENTS_DELETED.inc_by(deleted as f64);
        info!(
            deleted = deleted,
            cutoff = %cutoff,
            "Retention sweep removed expired notifications"
        );
        Ok(deleted)
    }
}

/// Next 02:00 in São Paulo, expressed in UTC.
pub fn next_run_after(now: DateTime<Utc>) -> DateTime<Utc> {
    let run_time = NaiveTime::from_hms_opt(2, 0, 0).unwrap();
    let local_now = now.with_timezone(&Sao_Paulo);

    let mut run_date = local_now.date_naive();
    if local_now.time() >= run_time {
        run_date = run_date.succ_opt().unwrap();
    }

    match Sao_Paulo.from_local_datetime(&run_date.and_time(run_time)).earliest() {
        Some(t) => t.with_timezone(&Utc),
        // 02:00 skipped by a DST jump; fall back to a plain day later
        None => now + Duration::hours(24),
    }
}

pub async fn run_retention_scheduler(sweeper: RetentionSweeper) -> Result<()> {
    info!("Starting notification retention scheduler (daily 02:00 America/Sao_Paulo)");

    loop {
        let now = Utc::now();
        let next = next_run_after(now);
        let wait = (next - now).to_std().unwrap_or_default();
        info!(next_run = %next, "Retention scheduler sleeping until next run");
        tokio::time::sleep(wait).await;

        if let Err(e) = sweeper.purge_expired(Utc::now()).await {
            // No retry; the next scheduled tick naturally catches the backlog
            error!(error = %e, "Retention sweep failed");
        }
    }
}
