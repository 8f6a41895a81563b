//! # Server Configuration
//!
//! Router construction and the `serve` entry point, which also runs the
//! reconcile queue worker and scheduler until shutdown.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::app::AppServices;
use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::handlers;
use crate::telemetry::trace_context_middleware;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub services: AppServices,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let operator_routes = Router::new()
        .route(
            "/owners/{owner_id}/repositories",
            get(handlers::owners::list_repositories),
        )
        .route(
            "/owners/{owner_id}/repository-urls/validate",
            post(handlers::owners::validate_repository_urls),
        )
        .route(
            "/owners/{owner_id}/repository-urls",
            put(handlers::owners::replace_repository_urls),
        )
        .route(
            "/owners/{owner_id}/reconcile",
            post(handlers::reconcile::reconcile_owner),
        )
        .route("/reconcile", post(handlers::reconcile::reconcile_all))
        .route_layer(middleware::from_fn_with_state(
            state.config.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/providers", get(handlers::providers::list_providers))
        .merge(operator_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_context_middleware))
}

/// Serves the API and runs background reconciliation until Ctrl-C.
pub async fn run_server(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<()> {
    let addr = config
        .bind_addr()
        .with_context(|| format!("Invalid server address: {}", config.api_bind_addr))?;

    let db = Arc::new(db);
    let services = AppServices::build(&config, db.clone())?;
    let shutdown = CancellationToken::new();

    let worker = tokio::spawn(services.queue_worker(&config).run(shutdown.clone()));
    let scheduler = tokio::spawn(services.scheduler(&config).run(shutdown.clone()));

    let state = AppState {
        config: Arc::new(config),
        db,
        services,
    };
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Server listening");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    let _ = tokio::join!(worker, scheduler);
    Ok(())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::providers::list_providers,
        crate::handlers::owners::list_repositories,
        crate::handlers::owners::validate_repository_urls,
        crate::handlers::owners::replace_repository_urls,
        crate::handlers::reconcile::reconcile_owner,
        crate::handlers::reconcile::reconcile_all,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::handlers::HealthResponse,
            crate::handlers::providers::ProvidersResponse,
            crate::providers::ProviderInfo,
            crate::handlers::owners::RepositoriesResponse,
            crate::handlers::owners::RepositoryUrlsRequest,
            crate::handlers::owners::ValidateUrlsResponse,
            crate::handlers::owners::ReplaceUrlsResponse,
            crate::handlers::reconcile::ReconcileAllRequest,
            crate::handlers::reconcile::ReconcileOwnerResponse,
            crate::handlers::reconcile::ReconcileAllResponse,
            crate::domain::RepositoryMetadata,
            crate::domain::RepositoryRecord,
            crate::domain::ChangeAction,
            crate::domain::ChangeEvent,
            crate::validator::ValidationIssue,
            crate::validator::ValidationReport,
            crate::reconciler::ReconcileReport,
            crate::reconciler::ReconcilePhase,
            crate::reconciler::PlannedChange,
            crate::reconciler::RecordFailure,
            crate::batch::BatchSummary,
            crate::batch::OwnerFailure,
        )
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Repository Sync API",
        description = "Reconciles owners' declared repository URLs into repository records",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
