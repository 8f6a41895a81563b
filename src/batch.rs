//! Batch driver
//!
//! Runs the reconciler for one owner or for every reconcilable owner,
//! dispatching change events and invalidating cached views afterwards.

use metrics::counter;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, instrument};
use utoipa::ToSchema;

use crate::domain::ChangeAction;
use crate::notify::{CACHE_TAG, CacheInvalidator, NotificationSink};
use crate::reconciler::{ReconcileError, ReconcileReport, Reconciler};
use crate::repositories::{OwnerDirectory, StoreError};

/// An owner whose pass could not run at all.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OwnerFailure {
    pub owner_id: i64,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct BatchSummary {
    pub dry_run: bool,
    /// Owners visited
    pub owners: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Changes planned across all owners, applied or not
    pub planned: usize,
    /// Individual records skipped by storage failures
    pub record_failures: usize,
    pub failed_owners: Vec<OwnerFailure>,
}

impl BatchSummary {
    fn absorb(&mut self, report: &ReconcileReport) {
        self.created += report.applied(ChangeAction::Created);
        self.updated += report.applied(ChangeAction::Updated);
        self.deleted += report.applied(ChangeAction::Deleted);
        self.planned += report.planned.len();
        self.record_failures += report.failures.len();
    }
}

type OwnerLocks = Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>;

#[derive(Clone)]
pub struct BatchDriver {
    reconciler: Arc<Reconciler>,
    owners: Arc<dyn OwnerDirectory>,
    sink: Arc<dyn NotificationSink>,
    cache: Arc<dyn CacheInvalidator>,
    concurrency: usize,
    owner_locks: OwnerLocks,
}

impl BatchDriver {
    pub fn new(
        reconciler: Arc<Reconciler>,
        owners: Arc<dyn OwnerDirectory>,
        sink: Arc<dyn NotificationSink>,
        cache: Arc<dyn CacheInvalidator>,
        concurrency: usize,
    ) -> Self {
        Self {
            reconciler,
            owners,
            sink,
            cache,
            concurrency: concurrency.max(1),
            owner_locks: Arc::default(),
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    fn owner_lock(&self, owner_id: i64) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .owner_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(owner_id).or_default().clone()
    }

    /// Drops the owner's lock entry once no other pass holds or awaits it.
    fn release_owner_lock(&self, owner_id: i64, lock: Arc<AsyncMutex<()>>) {
        let mut locks = self
            .owner_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // One reference in the map plus ours
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&owner_id);
        }
    }

    /// Owners with a pass currently running or waiting.
    pub fn active_owner_locks(&self) -> usize {
        self.owner_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Reconciles one owner, serialized with any other pass for the same owner.
    async fn run_owner(
        &self,
        owner_id: i64,
        dry_run: bool,
    ) -> Result<ReconcileReport, ReconcileError> {
        let lock = self.owner_lock(owner_id);
        let result = {
            let _guard = lock.lock().await;
            self.reconcile_and_notify(owner_id, dry_run).await
        };
        self.release_owner_lock(owner_id, lock);
        result
    }

    async fn reconcile_and_notify(
        &self,
        owner_id: i64,
        dry_run: bool,
    ) -> Result<ReconcileReport, ReconcileError> {
        let report = self.reconciler.reconcile(owner_id, dry_run).await?;
        for event in &report.events {
            self.sink.notify(event).await;
        }
        Ok(report)
    }

    fn invalidate(&self, dry_run: bool) {
        if !dry_run {
            self.cache.invalidate_tags(&[CACHE_TAG]);
        }
    }

    #[instrument(skip(self))]
    pub async fn reconcile_one(
        &self,
        owner_id: i64,
        dry_run: bool,
    ) -> Result<ReconcileReport, ReconcileError> {
        let report = self.run_owner(owner_id, dry_run).await?;
        self.invalidate(dry_run);
        Ok(report)
    }

    /// Reconciles every owner with declared URLs or persisted records.
    ///
    /// One owner's failure is recorded in the summary and never stops the others.
    #[instrument(skip(self), fields(concurrency = self.concurrency))]
    pub async fn reconcile_all(&self, dry_run: bool) -> Result<BatchSummary, StoreError> {
        let owner_ids = self.owners.reconcilable_owners().await?;
        let mut summary = BatchSummary {
            dry_run,
            owners: owner_ids.len(),
            ..BatchSummary::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for owner_id in owner_ids {
            let driver = self.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                (owner_id, driver.run_owner(owner_id, dry_run).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(report))) => summary.absorb(&report),
                Ok((owner_id, Err(err))) => {
                    error!(owner_id, error = %err, "Owner reconciliation failed");
                    counter!("reconcile_owner_failures_total").increment(1);
                    summary.failed_owners.push(OwnerFailure {
                        owner_id,
                        error: err.to_string(),
                    });
                }
                Err(join_err) => {
                    error!(error = %join_err, "Owner reconciliation task aborted");
                    counter!("reconcile_owner_failures_total").increment(1);
                }
            }
        }
        summary.failed_owners.sort_by_key(|f| f.owner_id);

        self.invalidate(dry_run);
        info!(
            owners = summary.owners,
            created = summary.created,
            updated = summary.updated,
            deleted = summary.deleted,
            failed = summary.failed_owners.len(),
            "Batch reconciliation finished"
        );
        Ok(summary)
    }
}
