//! # Reconcile Scheduler
//!
//! Background task that periodically enqueues a reconcile job for every owner
//! with declared URLs or persisted records. Enqueueing is deduplicated against
//! already-queued jobs, so overlapping instances do not pile up work.

use metrics::{counter, histogram};
use std::sync::Arc;
use tokio::time::{Duration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::repositories::{OwnerDirectory, ReconcileJobRepository};

pub struct ReconcileScheduler {
    owners: Arc<dyn OwnerDirectory>,
    jobs: ReconcileJobRepository,
    interval: Duration,
    dry_run: bool,
}

impl ReconcileScheduler {
    pub fn new(
        owners: Arc<dyn OwnerDirectory>,
        jobs: ReconcileJobRepository,
        interval: Duration,
        dry_run: bool,
    ) -> Self {
        Self {
            owners,
            jobs,
            interval,
            dry_run,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Starting reconcile scheduler");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Reconcile scheduler shutdown requested");
                    break;
                }
                _ = sleep(self.interval) => {
                    let tick_started = Instant::now();
                    if let Err(err) = self.tick().await {
                        error!(error = ?err, "Scheduler tick failed");
                    }
                    histogram!("reconcile_scheduler_tick_duration_ms")
                        .record(tick_started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Reconcile scheduler stopped");
    }

    /// Enqueues one job per reconcilable owner. Returns how many were new.
    pub async fn tick(&self) -> anyhow::Result<usize> {
        let owners = self.owners.reconcilable_owners().await?;
        let created = self.jobs.enqueue_many(&owners, self.dry_run).await?;

        counter!("reconcile_jobs_scheduled_total").increment(created as u64);
        debug!(
            owners = owners.len(),
            enqueued = created,
            "Scheduler tick complete"
        );
        Ok(created)
    }
}
