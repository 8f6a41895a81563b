//! # Owner Handlers
//!
//! Listing an owner's repository records and managing the repository URLs
//! they declare. Replacing the declaration validates every URL first and
//! reconciles the owner straight away.

use std::sync::Arc;

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::OperatorAuth;
use crate::domain::{RepositoryMetadata, RepositoryRecord};
use crate::error::{ApiError, not_found};
use crate::handlers::check_owner_id;
use crate::notify::BufferedMessenger;
use crate::reconciler::ReconcileReport;
use crate::repositories::OwnerDirectory;
use crate::server::AppState;
use crate::validator::{ValidationIssue, ValidationReport};

#[derive(Debug, Serialize, ToSchema)]
pub struct RepositoriesResponse {
    pub owner_id: i64,
    pub repositories: Vec<RepositoryRecord>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RepositoryUrlsRequest {
    /// Repository URLs, one per entry; blank entries are ignored
    pub urls: Vec<String>,
    /// Display name stored with the owner when it is created or renamed
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ValidateUrlsResponse {
    pub valid: bool,
    /// Every issue message joined by a space
    pub summary: String,
    pub issues: Vec<ValidationIssue>,
    pub accepted: Vec<RepositoryMetadata>,
    /// Provider errors raised while fetching metadata
    pub messages: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReplaceUrlsResponse {
    pub urls: Vec<String>,
    pub report: ReconcileReport,
}

/// Lists the repository records persisted for an owner
#[utoipa::path(
    get,
    path = "/owners/{owner_id}/repositories",
    params(("owner_id" = i64, Path, description = "Owner id")),
    responses(
        (status = 200, description = "Repository records", body = RepositoriesResponse),
        (status = 400, description = "Invalid owner id", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Owner not found", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "owners"
)]
pub async fn list_repositories(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    Path(owner_id): Path<i64>,
) -> Result<Json<RepositoriesResponse>, ApiError> {
    let owner_id = check_owner_id(owner_id)?;
    if !state.services.owners.owner_exists(owner_id).await? {
        return Err(not_found("Owner does not exist."));
    }

    let repositories = state.services.store.find_all_by_owner(owner_id).await?;
    Ok(Json(RepositoriesResponse {
        owner_id,
        repositories,
    }))
}

/// Checks URLs against the enabled providers without storing anything
#[utoipa::path(
    post,
    path = "/owners/{owner_id}/repository-urls/validate",
    params(("owner_id" = i64, Path, description = "Submitting owner id")),
    request_body = RepositoryUrlsRequest,
    responses(
        (status = 200, description = "Validation result", body = ValidateUrlsResponse, example = json!({
            "valid": false,
            "summary": "The repository url https://example.com/nope is not valid.",
            "issues": [{ "kind": "invalid_url", "url": "https://example.com/nope" }],
            "accepted": [],
            "messages": []
        })),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 503, description = "No providers enabled", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "owners"
)]
pub async fn validate_repository_urls(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    Path(owner_id): Path<i64>,
    payload: Result<Json<RepositoryUrlsRequest>, JsonRejection>,
) -> Result<Json<ValidateUrlsResponse>, ApiError> {
    let owner_id = check_owner_id(owner_id)?;
    let Json(request) = payload?;

    let (report, messages) = validate(&state, owner_id, &request.urls).await?;
    Ok(Json(ValidateUrlsResponse {
        valid: report.is_valid(),
        summary: report.summary(),
        issues: report.issues,
        accepted: report.accepted,
        messages,
    }))
}

/// Replaces an owner's declared URLs and reconciles the owner
#[utoipa::path(
    put,
    path = "/owners/{owner_id}/repository-urls",
    params(("owner_id" = i64, Path, description = "Owner id")),
    request_body = RepositoryUrlsRequest,
    responses(
        (status = 200, description = "Declaration stored and reconciled", body = ReplaceUrlsResponse),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 422, description = "At least one URL failed validation", body = ApiError),
        (status = 503, description = "No providers enabled", body = ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "owners"
)]
pub async fn replace_repository_urls(
    State(state): State<AppState>,
    _auth: OperatorAuth,
    Path(owner_id): Path<i64>,
    payload: Result<Json<RepositoryUrlsRequest>, JsonRejection>,
) -> Result<Json<ReplaceUrlsResponse>, ApiError> {
    let owner_id = check_owner_id(owner_id)?;
    let Json(request) = payload?;

    let urls: Vec<String> = request
        .urls
        .iter()
        .map(|url| url.trim())
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect();

    let (report, messages) = validate(&state, owner_id, &urls).await?;
    if !report.is_valid() {
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "INVALID_REPOSITORY_URLS",
            &report.summary(),
        )
        .with_details(serde_json::json!({
            "issues": report.issues,
            "messages": messages,
        })));
    }

    let services = &state.services;
    services
        .owners
        .ensure_owner(owner_id, request.name.as_deref())
        .await?;
    services.owners.replace_declared_urls(owner_id, &urls).await?;

    let report = services
        .driver
        .reconcile_one(owner_id, state.config.dry_run)
        .await?;

    Ok(Json(ReplaceUrlsResponse { urls, report }))
}

async fn validate(
    state: &AppState,
    owner_id: i64,
    urls: &[String],
) -> Result<(ValidationReport, Vec<String>), ApiError> {
    let messenger = Arc::new(BufferedMessenger::new());
    let report = state
        .services
        .validator
        .with_messenger(messenger.clone())
        .validate_urls(urls, owner_id)
        .await?;

    tracing::debug!(
        owner_id,
        issues = report.issues.len(),
        accepted = report.accepted.len(),
        "Validated repository urls"
    );
    Ok((report, messenger.errors()))
}
