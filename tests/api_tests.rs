//! HTTP API tests driving the router with `tower::ServiceExt::oneshot`.

mod test_utils;

use anyhow::Result;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use repo_sync::repositories::OwnerDirectory;
use repo_sync::server::create_app;
use test_utils::{Harness, OPERATOR_TOKEN, test_config};

const WIDGET: &str = "https://github.com/acme/widget";

fn app(h: &Harness) -> Router {
    create_app(h.app_state(test_config()))
}

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {OPERATOR_TOKEN}"));
    let body = match body {
        Some(value) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app.oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn root_and_health_are_public() -> Result<()> {
    let h = Harness::github_only().await?;

    let response = app(&h)
        .oneshot(Request::builder().uri("/").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app(&h)
        .oneshot(Request::builder().uri("/healthz").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await?)?;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["declarations_present"], false);
    assert_eq!(body["enabled_providers"], json!(["github"]));
    Ok(())
}

#[tokio::test]
async fn providers_lists_enabled_first() -> Result<()> {
    let h = Harness::github_only().await?;

    let response = app(&h)
        .oneshot(Request::builder().uri("/providers").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await?)?;
    assert_eq!(body["providers"][0]["id"], "github");
    assert_eq!(body["providers"][0]["enabled"], true);
    assert_eq!(body["providers"][1]["id"], "gitlab");
    assert_eq!(body["providers"][1]["enabled"], false);
    assert_eq!(body["help_text"], "https://github.com/");
    Ok(())
}

#[tokio::test]
async fn operator_routes_require_a_token() -> Result<()> {
    let h = Harness::github_only().await?;

    let response = app(&h)
        .oneshot(
            Request::builder()
                .uri("/owners/1/repositories")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/problem+json"
    );
    Ok(())
}

#[tokio::test]
async fn anonymous_owner_is_rejected() -> Result<()> {
    let h = Harness::github_only().await?;

    let (status, body) = send(app(&h), Method::GET, "/owners/0/repositories", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
    Ok(())
}

#[tokio::test]
async fn unknown_owner_is_not_found() -> Result<()> {
    let h = Harness::github_only().await?;

    let (status, body) = send(app(&h), Method::GET, "/owners/42/repositories", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Owner does not exist.");

    let (status, _) = send(app(&h), Method::POST, "/owners/42/reconcile", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn validate_reports_issues_without_storing() -> Result<()> {
    let h = Harness::github_only().await?;
    h.github.set(WIDGET, "acme/widget", 1);

    let (status, body) = send(
        app(&h),
        Method::POST,
        "/owners/5/repository-urls/validate",
        Some(json!({ "urls": [WIDGET, "https://github.com/acme/gone", "ftp://nope"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);
    assert_eq!(body["accepted"][0]["key"], "acme/widget");
    assert_eq!(body["issues"][0]["kind"], "not_found");
    assert_eq!(body["issues"][1]["kind"], "invalid_url");
    assert_eq!(body["messages"], json!(["GitHub error: repository not found"]));

    assert!(!h.services.owners.owner_exists(5).await?);
    Ok(())
}

#[tokio::test]
async fn replacing_urls_stores_and_reconciles() -> Result<()> {
    let h = Harness::github_only().await?;
    h.github.set(WIDGET, "acme/widget", 1);

    let (status, body) = send(
        app(&h),
        Method::PUT,
        "/owners/5/repository-urls",
        Some(json!({ "urls": [WIDGET, "   "], "name": "Acme" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["urls"], json!([WIDGET]));
    assert_eq!(body["report"]["events"][0]["action"], "created");

    let owner = h.services.owners.find(5).await?.expect("owner");
    assert_eq!(owner.name.as_deref(), Some("Acme"));
    assert_eq!(h.services.owners.declared_urls(5).await?, vec![WIDGET.to_string()]);

    let (status, body) = send(app(&h), Method::GET, "/owners/5/repositories", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["repositories"][0]["key"], "acme/widget");
    assert_eq!(body["repositories"][0]["source"], "github");
    Ok(())
}

#[tokio::test]
async fn invalid_urls_leave_the_declaration_untouched() -> Result<()> {
    let h = Harness::github_only().await?;

    let (status, body) = send(
        app(&h),
        Method::PUT,
        "/owners/5/repository-urls",
        Some(json!({ "urls": ["ftp://nope"] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INVALID_REPOSITORY_URLS");
    assert_eq!(body["message"], "The repository url ftp://nope is not valid.");
    assert!(!h.services.owners.owner_exists(5).await?);
    Ok(())
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() -> Result<()> {
    let h = Harness::github_only().await?;

    let (status, body) = send(
        app(&h),
        Method::POST,
        "/owners/5/repository-urls/validate",
        Some(json!({ "links": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
    Ok(())
}

#[tokio::test]
async fn reconcile_owner_inline_dry_run_and_queued() -> Result<()> {
    let h = Harness::github_only().await?;
    h.github.set(WIDGET, "acme/widget", 1);
    h.services
        .owners
        .replace_declared_urls(5, &[WIDGET.to_string()])
        .await?;

    let (status, body) = send(app(&h), Method::POST, "/owners/5/reconcile?dry_run=true", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queued"], false);
    assert_eq!(body["report"]["dry_run"], true);
    assert_eq!(body["report"]["planned"][0]["action"], "created");
    assert_eq!(body["report"]["events"], json!([]));

    let (status, body) = send(app(&h), Method::POST, "/owners/5/reconcile?queue=true", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queued"], true);
    assert!(body["job_id"].is_string());
    assert!(body.get("report").is_none());

    let (status, body) = send(app(&h), Method::POST, "/owners/5/reconcile", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["report"]["events"][0]["action"], "created");
    Ok(())
}

#[tokio::test]
async fn reconcile_all_inline_and_queued() -> Result<()> {
    let h = Harness::github_only().await?;
    h.github.set(WIDGET, "acme/widget", 1);
    h.services
        .owners
        .replace_declared_urls(5, &[WIDGET.to_string()])
        .await?;

    let (status, body) = send(app(&h), Method::POST, "/reconcile", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["owners"], 1);
    assert_eq!(body["summary"]["created"], 1);

    let (status, body) = send(
        app(&h),
        Method::POST,
        "/reconcile",
        Some(json!({ "queue": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enqueued"], 1);
    Ok(())
}

#[tokio::test]
async fn openapi_document_is_served() -> Result<()> {
    let h = Harness::github_only().await?;

    let response = app(&h)
        .oneshot(Request::builder().uri("/openapi.json").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let doc: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await?)?;
    assert!(doc["paths"]["/owners/{owner_id}/repository-urls"].is_object());
    assert!(doc["components"]["securitySchemes"]["bearer_auth"].is_object());
    Ok(())
}
