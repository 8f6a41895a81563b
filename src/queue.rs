//! # Reconcile Queue Worker
//!
//! Claims due reconcile jobs and runs them through the batch driver with
//! bounded concurrency. Delivery is at-least-once: a failed or abandoned job
//! is retried with jittered exponential backoff until it runs out of attempts.

use anyhow::Result;
use chrono::Utc;
use metrics::{counter, histogram};
use rand::{Rng, thread_rng};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::batch::BatchDriver;
use crate::config::QueueConfig;
use crate::models::reconcile_job::Model as ReconcileJob;
use crate::repositories::ReconcileJobRepository;

#[derive(Clone)]
pub struct QueueWorker {
    jobs: ReconcileJobRepository,
    driver: BatchDriver,
    config: QueueConfig,
}

/// Seconds to wait before the next attempt, after `attempts_completed`
/// failed attempts.
pub fn retry_backoff_seconds(config: &QueueConfig, attempts_completed: i32) -> f64 {
    let exponent = attempts_completed.saturating_sub(1).clamp(0, 30);
    let backoff = (config.backoff_base_seconds as f64 * 2_f64.powi(exponent))
        .min(config.backoff_max_seconds as f64);
    let jitter = thread_rng().gen_range(0.0..=config.jitter_factor * backoff);
    backoff + jitter
}

impl QueueWorker {
    pub fn new(jobs: ReconcileJobRepository, driver: BatchDriver, config: QueueConfig) -> Self {
        Self {
            jobs,
            driver,
            config,
        }
    }

    /// Runs ticks until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            tick_ms = self.config.tick_ms,
            concurrency = self.config.concurrency,
            "Starting reconcile queue worker"
        );
        let tick = Duration::from_millis(self.config.tick_ms);

        loop {
            let started = Instant::now();
            if let Err(err) = self.tick().await {
                error!(error = ?err, "Queue worker tick failed");
            }
            histogram!("reconcile_queue_tick_duration_ms")
                .record(started.elapsed().as_secs_f64() * 1_000.0);

            let remaining = tick.saturating_sub(started.elapsed());
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Queue worker shutdown requested");
                    break;
                }
                _ = sleep(remaining) => {}
            }
        }

        info!("Queue worker stopped");
    }

    /// Recovers abandoned jobs, then claims and runs due ones. Returns the
    /// number of jobs run.
    #[instrument(skip(self), fields(claim_batch = self.config.claim_batch))]
    pub async fn tick(&self) -> Result<usize> {
        let stale_after = chrono::Duration::seconds((self.config.max_run_seconds * 2) as i64);
        let requeued = self.jobs.requeue_stale(Utc::now() - stale_after).await?;
        if requeued > 0 {
            warn!(requeued, "Requeued abandoned reconcile jobs");
            counter!("reconcile_jobs_requeued_total").increment(requeued);
        }

        let jobs = self.jobs.claim_due(self.config.claim_batch).await?;
        let count = jobs.len();
        if count == 0 {
            debug!("No due reconcile jobs");
            return Ok(0);
        }
        info!(count, "Claimed reconcile jobs");

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut handles = Vec::with_capacity(count);
        for job in jobs {
            let worker = self.clone();
            let permit = semaphore.clone().acquire_owned().await?;
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                if let Err(err) = worker.run_job(job).await {
                    error!(error = ?err, "Failed to record reconcile job outcome");
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
        Ok(count)
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, owner_id = job.owner_id, attempt = job.attempts))]
    async fn run_job(&self, job: ReconcileJob) -> Result<()> {
        let limit = Duration::from_secs(self.config.max_run_seconds);
        let outcome = timeout(limit, self.driver.reconcile_one(job.owner_id, job.dry_run)).await;

        let failure = match outcome {
            Ok(Ok(report)) if !report.has_failures() => None,
            Ok(Ok(report)) => Some(format!(
                "{} record(s) failed: {}",
                report.failures.len(),
                report
                    .failures
                    .iter()
                    .map(|f| f.error.as_str())
                    .collect::<Vec<_>>()
                    .join("; ")
            )),
            Ok(Err(err)) => Some(err.to_string()),
            Err(_) => Some(format!("timed out after {}s", limit.as_secs())),
        };

        let Some(message) = failure else {
            self.jobs.mark_succeeded(&job).await?;
            counter!("reconcile_jobs_succeeded_total").increment(1);
            debug!("Reconcile job succeeded");
            return Ok(());
        };

        if job.attempts >= self.config.max_attempts {
            self.jobs.mark_attempt_failed(&job, &message, None).await?;
            counter!("reconcile_jobs_failed_total").increment(1);
            error!(error = %message, "Reconcile job failed permanently");
        } else {
            let backoff = retry_backoff_seconds(&self.config, job.attempts);
            let retry_at = Utc::now() + chrono::Duration::milliseconds((backoff * 1_000.0) as i64);
            self.jobs
                .mark_attempt_failed(&job, &message, Some(retry_at))
                .await?;
            counter!("reconcile_jobs_retried_total").increment(1);
            histogram!("reconcile_job_backoff_seconds").record(backoff);
            warn!(error = %message, backoff_seconds = backoff, "Reconcile job will be retried");
        }
        Ok(())
    }
}
