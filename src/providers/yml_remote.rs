//! Remote YAML manifest provider
//!
//! A manifest is a YAML mapping whose first key is the repository key:
//!
//! ```yaml
//! widget-repo:
//!   label: Widget
//!   description: Widgets for everyone
//!   num_open_issues: 6
//! ```

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::sync::{Arc, OnceLock};

use super::registry::ProviderRegistry;
use super::{FetchError, RepositoryProvider};
use crate::domain::RepositoryMetadata;

pub const YML_REMOTE_PROVIDER_ID: &str = "yml_remote";

static MANIFEST_URL: OnceLock<Option<Regex>> = OnceLock::new();

fn url_pattern() -> Option<&'static Regex> {
    MANIFEST_URL
        .get_or_init(|| Regex::new(r"^https?://[a-zA-Z0-9.\-:]+/[a-zA-Z0-9_\-.%/]+\.ya?ml$").ok())
        .as_ref()
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    label: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    num_open_issues: u64,
}

pub struct YmlRemoteProvider {
    client: reqwest::Client,
}

impl YmlRemoteProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Parses manifest text fetched from `url`.
pub fn parse_manifest(body: &str, url: &str) -> Result<RepositoryMetadata, FetchError> {
    let mapping: Mapping =
        serde_yaml::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;
    let (key, entry) = mapping
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::Parse("manifest is empty".to_string()))?;

    let key = match key {
        Value::String(key) => key,
        Value::Number(key) => key.to_string(),
        other => {
            return Err(FetchError::Parse(format!(
                "manifest key must be a string, got {other:?}"
            )));
        }
    };
    let entry: ManifestEntry =
        serde_yaml::from_value(entry).map_err(|e| FetchError::Parse(e.to_string()))?;

    Ok(RepositoryMetadata {
        key,
        label: entry.label,
        description: entry.description,
        open_issue_count: entry.num_open_issues,
        source: YML_REMOTE_PROVIDER_ID.to_string(),
        url: url.to_string(),
    })
}

#[async_trait]
impl RepositoryProvider for YmlRemoteProvider {
    fn id(&self) -> &'static str {
        YML_REMOTE_PROVIDER_ID
    }

    fn label(&self) -> &'static str {
        "Remote .yml file"
    }

    fn validate(&self, url: &str) -> bool {
        url_pattern().is_some_and(|re| re.is_match(url))
    }

    fn validate_help_text(&self) -> &'static str {
        r#"https://anything.anything/anything/anything.yml (or "http")"#
    }

    async fn fetch(&self, url: &str) -> Result<RepositoryMetadata, FetchError> {
        let unreachable = |reason: String| FetchError::Unreachable {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(unreachable(format!("status {}", status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| unreachable(e.to_string()))?;
        parse_manifest(&body, url)
    }
}

/// Register the remote manifest provider with the registry
pub fn register_yml_remote_provider(
    registry: &mut ProviderRegistry,
    provider: Arc<YmlRemoteProvider>,
) {
    registry.register(provider);
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MANIFEST: &str = "widget-repo:\n  label: Widget\n  description: Widgets for everyone\n  num_open_issues: 6\n";

    #[test]
    fn validates_manifest_urls() {
        let yml = YmlRemoteProvider::new(reqwest::Client::new());
        assert!(yml.validate("https://example.com/repos/widget.yml"));
        assert!(yml.validate("http://localhost:8080/widget.yaml"));
        assert!(!yml.validate("https://example.com/widget.json"));
        assert!(!yml.validate("ftp://example.com/widget.yml"));
        assert!(!yml.validate("https://example.com/widget.yml?raw=1"));
    }

    #[test]
    fn first_key_names_the_repository() {
        let body = format!("{MANIFEST}second-repo:\n  label: Ignored\n");
        let metadata = parse_manifest(&body, "https://example.com/widget.yml").unwrap();
        assert_eq!(metadata.key, "widget-repo");
        assert_eq!(metadata.label, "Widget");
        assert_eq!(metadata.open_issue_count, 6);
        assert_eq!(metadata.url, "https://example.com/widget.yml");
    }

    #[test]
    fn malformed_manifests_are_parse_errors() {
        for body in ["", "- just\n- a list\n", "widget-repo:\n  description: no label\n"] {
            assert!(
                matches!(parse_manifest(body, "https://example.com/w.yml"), Err(FetchError::Parse(_))),
                "body {body:?} should not parse"
            );
        }
    }

    #[tokio::test]
    async fn fetches_and_parses_remote_manifest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/manifests/widget.yml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MANIFEST))
            .mount(&server)
            .await;

        let url = format!("{}/manifests/widget.yml", server.uri());
        let metadata = YmlRemoteProvider::new(reqwest::Client::new())
            .fetch(&url)
            .await
            .unwrap();
        assert_eq!(metadata.key, "widget-repo");
        assert_eq!(metadata.source, "yml_remote");
        assert_eq!(metadata.url, url);
    }

    #[tokio::test]
    async fn missing_manifest_is_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = format!("{}/gone.yml", server.uri());
        let err = YmlRemoteProvider::new(reqwest::Client::new())
            .fetch(&url)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unreachable");
    }
}
