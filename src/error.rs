//! # Error Handling
//!
//! problem+json error responses for the HTTP API, with mappings from the
//! storage, registry, validation and reconciliation errors.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::providers::RegistryError;
use crate::reconciler::ReconcileError;
use crate::repositories::StoreError;
use crate::telemetry;
use crate::validator::ValidatorError;

/// Body of every non-2xx API response
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Machine-readable error code, SCREAMING_SNAKE_CASE
    pub code: Box<str>,
    pub message: Box<str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
            retry_after: None,
            trace_id: telemetry::current_trace_id().map(String::into_boxed_str),
        }
    }

    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    fn internal(message: &str) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            message,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );
        if let Some(retry_after) = self.retry_after
            && let Ok(value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    let sqlx_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(err)) => err,
        _ => return false,
    };
    sqlx_err
        .as_database_error()
        .is_some_and(|db_error| db_error.is_unique_violation())
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);
        Self::internal("An internal error occurred")
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {err}"),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {err}"),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Record not found: {record}"),
            ),
            sea_orm::DbErr::Conn(conn_err) => {
                tracing::error!("Database connection error: {:?}", conn_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            other => {
                tracing::error!("Database error: {:?}", other);
                Self::internal("Database error occurred")
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Database(db_err) => db_err.into(),
            StoreError::RecordNotFound(id) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Repository record {id} not found"),
            ),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(error: RegistryError) -> Self {
        tracing::error!(error = %error, "Provider configuration error");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "PROVIDER_MISCONFIGURED",
            &error.to_string(),
        )
    }
}

impl From<ValidatorError> for ApiError {
    fn from(error: ValidatorError) -> Self {
        match error {
            ValidatorError::NoProvidersEnabled => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "NO_PROVIDERS_ENABLED",
                &ValidatorError::NoProvidersEnabled.to_string(),
            ),
            ValidatorError::Registry(err) => err.into(),
        }
    }
}

impl From<ReconcileError> for ApiError {
    fn from(error: ReconcileError) -> Self {
        match error {
            ReconcileError::Registry(err) => err.into(),
            ReconcileError::Directory(err) => err.into(),
        }
    }
}

/// 401 with an optional message
pub fn unauthorized(message: Option<&str>) -> ApiError {
    ApiError::new(
        StatusCode::UNAUTHORIZED,
        "UNAUTHORIZED",
        message.unwrap_or("Authentication required"),
    )
}

pub fn not_found(message: &str) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
}

/// 400 with per-field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn anyhow_errors_hide_details() {
        let error: ApiError = anyhow::anyhow!("secret connection string").into();
        assert_eq!(error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(&*error.message, "An internal error occurred");
    }

    #[test]
    fn record_not_found_maps_to_404() {
        let error: ApiError = StoreError::RecordNotFound(uuid::Uuid::nil()).into();
        assert_eq!(error.status, StatusCode::NOT_FOUND);
        assert_eq!(&*error.code, "NOT_FOUND");
    }

    #[test]
    fn no_providers_maps_to_503() {
        let error: ApiError = ValidatorError::NoProvidersEnabled.into();
        assert_eq!(error.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(&*error.code, "NO_PROVIDERS_ENABLED");
    }

    #[test]
    fn unknown_provider_is_a_server_error() {
        let error: ApiError = ReconcileError::Registry(RegistryError::UnknownProvider {
            id: "bitbucket".into(),
        })
        .into();
        assert_eq!(error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(error.message.contains("bitbucket"));
    }

    #[tokio::test]
    async fn response_is_problem_json_with_retry_after() {
        let response = ApiError::new(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", "Slow down")
            .with_retry_after(30)
            .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
        assert_eq!(response.headers().get("retry-after").unwrap(), "30");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "RATE_LIMITED");
        assert_eq!(json["retry_after"], 30);
    }

    #[test]
    fn validation_error_carries_details() {
        let error = validation_error("Bad owner", serde_json::json!({ "owner_id": "must be > 0" }));
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert!(error.details.is_some());
    }
}
