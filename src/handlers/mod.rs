//! # API Handlers
//!
//! HTTP endpoint handlers. Owner and reconcile routes sit behind operator
//! authentication; `/`, `/healthz` and `/providers` are public.

use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::db;
use crate::error::{ApiError, validation_error};
use crate::models::ServiceInfo;
use crate::repositories::OwnerDirectory;
use crate::server::AppState;

pub mod owners;
pub mod providers;
pub mod reconcile;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok` when the database answers
    pub status: String,
    /// Whether any owner still declares a repository URL
    pub declarations_present: bool,
    /// Enabled provider ids in configured order
    pub enabled_providers: Vec<String>,
}

/// Liveness and readiness probe
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Database unavailable", body = ApiError)
    ),
    tag = "root"
)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    db::health_check(&state.db).await.map_err(|err| {
        tracing::warn!(error = ?err, "Health check failed");
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "Database unavailable",
        )
    })?;

    let declarations_present = state.services.owners.has_declarations().await?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        declarations_present,
        enabled_providers: state.services.registry.enabled_ids().to_vec(),
    }))
}

/// Rejects the anonymous owner id and negative ids.
pub(crate) fn check_owner_id(owner_id: i64) -> Result<i64, ApiError> {
    if owner_id <= 0 {
        return Err(validation_error(
            "Invalid owner id",
            serde_json::json!({ "owner_id": "must be a positive integer; 0 is the anonymous owner" }),
        ));
    }
    Ok(owner_id)
}
