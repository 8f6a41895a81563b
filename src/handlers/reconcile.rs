//! # Reconcile Handlers
//!
//! On-demand reconciliation for one owner or for every reconcilable owner,
//! either inline or through the job queue.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::batch::BatchSummary;
use crate::error::{ApiError, not_found};
use crate::handlers::check_owner_id;
use crate::reconciler::ReconcileReport;
use crate::repositories::OwnerDirectory;
use crate::server::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReconcileOwnerQuery {
    /// Plan changes without writing; defaults to the configured dry-run flag
    pub dry_run: Option<bool>,
    /// Enqueue a job instead of reconciling inline
    pub queue: Option<bool>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ReconcileAllRequest {
    /// Plan changes without writing; defaults to the configured dry-run flag
    #[serde(default)]
    pub dry_run: Option<bool>,
    /// Enqueue one job per owner instead of reconciling inline
    #[serde(default)]
    pub queue: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReconcileOwnerResponse {
    pub queued: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ReconcileReport>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReconcileAllResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<BatchSummary>,
    /// Jobs newly enqueued; owners with a job already waiting are skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enqueued: Option<usize>,
}

/// Reconciles one owner's repository records
#[utoipa::path(
    post,
    path = "/owners/{owner_id}/reconcile",
    params(
        ("owner_id" = i64, Path, description = "Owner id"),
        ReconcileOwnerQuery
    ),
    responses(
        (status = 200, description = "Reconciled inline or enqueued", body = ReconcileOwnerResponse),
        (status = 400, description = "Invalid owner id", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Owner not found", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "reconcile"
)]
pub async fn reconcile_owner(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    Path(owner_id): Path<i64>,
    Query(query): Query<ReconcileOwnerQuery>,
) -> Result<Json<ReconcileOwnerResponse>, ApiError> {
    let owner_id = check_owner_id(owner_id)?;
    if !state.services.owners.owner_exists(owner_id).await? {
        return Err(not_found("Owner does not exist."));
    }
    let dry_run = query.dry_run.unwrap_or(state.config.dry_run);

    if query.queue.unwrap_or(false) {
        let (job, created) = state.services.jobs.enqueue(owner_id, dry_run).await?;
        tracing::info!(owner_id, job_id = %job.id, created, "Reconcile requested via queue");
        return Ok(Json(ReconcileOwnerResponse {
            queued: true,
            job_id: Some(job.id),
            report: None,
        }));
    }

    let report = state.services.driver.reconcile_one(owner_id, dry_run).await?;
    Ok(Json(ReconcileOwnerResponse {
        queued: false,
        job_id: None,
        report: Some(report),
    }))
}

/// Reconciles every owner with declared URLs or persisted records
#[utoipa::path(
    post,
    path = "/reconcile",
    request_body = ReconcileAllRequest,
    responses(
        (status = 200, description = "Batch finished or jobs enqueued", body = ReconcileAllResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "reconcile"
)]
pub async fn reconcile_all(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    payload: Option<Json<ReconcileAllRequest>>,
) -> Result<Json<ReconcileAllResponse>, ApiError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let dry_run = request.dry_run.unwrap_or(state.config.dry_run);

    if request.queue.unwrap_or(false) {
        let owners = state.services.owners.reconcilable_owners().await?;
        let enqueued = state.services.jobs.enqueue_many(&owners, dry_run).await?;
        return Ok(Json(ReconcileAllResponse {
            summary: None,
            enqueued: Some(enqueued),
        }));
    }

    let summary = state.services.driver.reconcile_all(dry_run).await?;
    Ok(Json(ReconcileAllResponse {
        summary: Some(summary),
        enqueued: None,
    }))
}

