//! # ReconcileJob Repository
//!
//! Queue operations for the reconcile_jobs table: deduplicated enqueue,
//! single-flight claiming per owner, completion and retry bookkeeping.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::prelude::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, QueryTrait, Set, TransactionTrait,
};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::reconcile_job::{
    self, ActiveModel, Column, Entity as ReconcileJob, Model, STATUS_FAILED, STATUS_QUEUED,
    STATUS_RUNNING, STATUS_SUCCEEDED,
};

/// Repository for reconcile job database operations
#[derive(Debug, Clone)]
pub struct ReconcileJobRepository {
    pub db: Arc<DatabaseConnection>,
}

impl ReconcileJobRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Enqueues a job for `owner_id` unless an equivalent one is already queued.
    ///
    /// Returns the job and whether it was newly created.
    pub async fn enqueue(&self, owner_id: i64, dry_run: bool) -> Result<(Model, bool)> {
        if let Some(existing) = ReconcileJob::find()
            .filter(Column::OwnerId.eq(owner_id))
            .filter(Column::DryRun.eq(dry_run))
            .filter(Column::Status.eq(STATUS_QUEUED))
            .one(&*self.db)
            .await?
        {
            return Ok((existing, false));
        }

        let now = Utc::now().fixed_offset();
        let job = ActiveModel {
            id: Set(Uuid::new_v4()),
            owner_id: Set(owner_id),
            dry_run: Set(dry_run),
            status: Set(STATUS_QUEUED.to_string()),
            attempts: Set(0),
            scheduled_at: Set(now),
            retry_after: Set(None),
            started_at: Set(None),
            finished_at: Set(None),
            last_error: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        tracing::debug!(owner_id, job_id = %job.id, dry_run, "Reconcile job enqueued");
        Ok((job, true))
    }

    /// Enqueues one job per owner, returning how many were newly created.
    pub async fn enqueue_many(&self, owner_ids: &[i64], dry_run: bool) -> Result<usize> {
        let mut created = 0;
        for owner_id in owner_ids {
            let (_, is_new) = self.enqueue(*owner_id, dry_run).await?;
            if is_new {
                created += 1;
            }
        }
        Ok(created)
    }

    /// Claims up to `limit` due jobs, never more than one per owner and never
    /// for an owner that already has a running job.
    pub async fn claim_due(&self, limit: usize) -> Result<Vec<Model>> {
        let now = Utc::now().fixed_offset();
        let txn = self.db.begin().await?;

        let candidates: Vec<(Uuid, i64)> = ReconcileJob::find()
            .select_only()
            .column(Column::Id)
            .column(Column::OwnerId)
            .filter(
                Column::Status
                    .eq(STATUS_QUEUED)
                    .and(Column::ScheduledAt.lte(now))
                    .and(Column::RetryAfter.is_null().or(Column::RetryAfter.lte(now))),
            )
            .filter(
                Column::OwnerId.not_in_subquery(
                    ReconcileJob::find()
                        .select_only()
                        .column(Column::OwnerId)
                        .filter(Column::Status.eq(STATUS_RUNNING))
                        .into_query(),
                ),
            )
            .order_by_asc(Column::ScheduledAt)
            .limit(Some((limit as u64).saturating_mul(4)))
            .into_tuple()
            .all(&txn)
            .await?;

        let mut owners = HashSet::new();
        let ids: Vec<Uuid> = candidates
            .into_iter()
            .filter(|(_, owner_id)| owners.insert(*owner_id))
            .take(limit)
            .map(|(id, _)| id)
            .collect();

        if ids.is_empty() {
            txn.commit().await?;
            return Ok(Vec::new());
        }

        ReconcileJob::update_many()
            .col_expr(Column::Status, Expr::value(STATUS_RUNNING))
            .col_expr(Column::StartedAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .col_expr(Column::Attempts, Expr::col(Column::Attempts).add(1))
            .filter(Column::Id.is_in(ids.clone()))
            .filter(Column::Status.eq(STATUS_QUEUED))
            .exec(&txn)
            .await?;

        let claimed = ReconcileJob::find()
            .filter(Column::Id.is_in(ids))
            .filter(Column::Status.eq(STATUS_RUNNING))
            .filter(Column::StartedAt.eq(now))
            .order_by_asc(Column::ScheduledAt)
            .all(&txn)
            .await?;

        txn.commit().await?;
        Ok(claimed)
    }

    pub async fn mark_succeeded(&self, job: &Model) -> Result<Model> {
        let now = Utc::now().fixed_offset();
        let mut active: ActiveModel = job.clone().into();
        active.status = Set(STATUS_SUCCEEDED.to_string());
        active.finished_at = Set(Some(now));
        active.retry_after = Set(None);
        active.last_error = Set(None);
        active.updated_at = Set(now);
        Ok(active.update(&*self.db).await?)
    }

    /// Records a failed attempt. With `retry_at` the job returns to the
    /// queue, otherwise it is marked failed for good.
    pub async fn mark_attempt_failed(
        &self,
        job: &Model,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<Model> {
        let now = Utc::now().fixed_offset();
        let mut active: ActiveModel = job.clone().into();
        active.last_error = Set(Some(error.to_string()));
        active.updated_at = Set(now);
        match retry_at {
            Some(at) => {
                active.status = Set(STATUS_QUEUED.to_string());
                active.retry_after = Set(Some(at.fixed_offset()));
            }
            None => {
                active.status = Set(STATUS_FAILED.to_string());
                active.finished_at = Set(Some(now));
            }
        }
        Ok(active.update(&*self.db).await?)
    }

    /// Returns running jobs started before `cutoff` to the queue.
    pub async fn requeue_stale(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let now = Utc::now().fixed_offset();
        let result = ReconcileJob::update_many()
            .col_expr(Column::Status, Expr::value(STATUS_QUEUED))
            .col_expr(Column::RetryAfter, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .col_expr(
                Column::LastError,
                Expr::value("abandoned while running; requeued"),
            )
            .filter(Column::Status.eq(STATUS_RUNNING))
            .filter(Column::StartedAt.lt(cutoff.fixed_offset()))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn find(&self, job_id: Uuid) -> Result<Option<Model>> {
        Ok(ReconcileJob::find_by_id(job_id).one(&*self.db).await?)
    }

    /// Lists jobs newest first, optionally filtered.
    pub async fn list(
        &self,
        owner_id: Option<i64>,
        status: Option<&str>,
        limit: u64,
    ) -> Result<Vec<reconcile_job::Model>> {
        let mut query = ReconcileJob::find().order_by_desc(Column::CreatedAt);
        if let Some(owner_id) = owner_id {
            query = query.filter(Column::OwnerId.eq(owner_id));
        }
        if let Some(status) = status {
            query = query.filter(Column::Status.eq(status));
        }
        Ok(query.limit(limit).all(&*self.db).await?)
    }
}
