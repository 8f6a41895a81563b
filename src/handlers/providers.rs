//! # Providers API Handlers

use axum::{extract::State, response::Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::providers::ProviderInfo;
use crate::server::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct ProvidersResponse {
    /// Enabled providers in configured order, then the disabled ones
    pub providers: Vec<ProviderInfo>,
    /// Help texts of the enabled providers joined by a space
    pub help_text: String,
}

/// Lists registered providers and whether each is enabled
#[utoipa::path(
    get,
    path = "/providers",
    responses(
        (status = 200, description = "Registered providers", body = ProvidersResponse, example = json!({
            "providers": [
                {
                    "id": "github",
                    "label": "GitHub",
                    "help_text": "https://github.com/vendor/name",
                    "enabled": true
                },
                {
                    "id": "yml_remote",
                    "label": "Remote .yml file",
                    "help_text": "https://anything.anything/anything/anything.yml (or \"http\")",
                    "enabled": false
                }
            ],
            "help_text": "https://github.com/vendor/name"
        })),
        (status = 500, description = "An enabled provider is not registered", body = ApiError)
    ),
    tag = "providers"
)]
pub async fn list_providers(
    State(state): State<AppState>,
) -> Result<Json<ProvidersResponse>, ApiError> {
    Ok(Json(ProvidersResponse {
        providers: state.services.registry.describe(),
        help_text: state.services.validator.help_text()?,
    }))
}
