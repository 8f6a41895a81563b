//! Providers module
//!
//! Pluggable repository metadata sources:
//! - The `RepositoryProvider` trait every source implements
//! - `FetchError`, the explicit failure side of a fetch
//! - `get_repo`, which collapses failures to "no repository" for the engine
//! - The provider registry resolving the configured, ordered enabled set

use async_trait::async_trait;
use metrics::counter;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::domain::RepositoryMetadata;
use crate::notify::Messenger;
use crate::secrets::{Credential, SecretStore};

pub mod github;
pub mod gitlab;
pub mod registry;
pub mod yml_remote;

pub use github::{GITHUB_PROVIDER_ID, GitHubProvider, register_github_provider};
pub use gitlab::{GITLAB_PROVIDER_ID, GitLabProvider, register_gitlab_provider};
pub use registry::{ProviderInfo, ProviderRegistry, RegistryError};
pub use yml_remote::{YML_REMOTE_PROVIDER_ID, YmlRemoteProvider, register_yml_remote_provider};

/// Why a provider could not produce metadata for a URL.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("credentials unavailable for {provider}: {reason}")]
    Credentials {
        provider: &'static str,
        reason: String,
    },
    #[error("url {url} does not name a repository")]
    InvalidUrl { url: String },
    #[error("repository not found")]
    NotFound,
    #[error("access denied with status {status}")]
    Unauthorized { status: u16 },
    #[error("rate limited{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<u64> },
    #[error("API request failed with status {status}")]
    Api { status: u16 },
    #[error("network error: {details}")]
    Network { details: String, timed_out: bool },
    #[error("{url} is unreachable: {reason}")]
    Unreachable { url: String, reason: String },
    #[error("malformed response: {0}")]
    Parse(String),
}

fn retry_hint(retry_after: &Option<u64>) -> String {
    retry_after
        .map(|secs| format!(" (retry after {secs}s)"))
        .unwrap_or_default()
}

impl FetchError {
    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Credentials { .. } => "credentials",
            FetchError::InvalidUrl { .. } => "invalid_url",
            FetchError::NotFound => "not_found",
            FetchError::Unauthorized { .. } => "unauthorized",
            FetchError::RateLimited { .. } => "rate_limited",
            FetchError::Api { .. } => "api",
            FetchError::Network {
                timed_out: true, ..
            } => "timeout",
            FetchError::Network { .. } => "network",
            FetchError::Unreachable { .. } => "unreachable",
            FetchError::Parse(_) => "parse",
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return FetchError::Parse(err.to_string());
        }
        FetchError::Network {
            timed_out: err.is_timeout(),
            details: err.to_string(),
        }
    }

    /// Maps a non-success API response status.
    pub(crate) fn from_status(response: &reqwest::Response) -> Self {
        let status = response.status();
        let header_u64 = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
        };

        match status {
            StatusCode::NOT_FOUND => FetchError::NotFound,
            StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited {
                retry_after: header_u64("retry-after"),
            },
            StatusCode::FORBIDDEN if header_u64("x-ratelimit-remaining") == Some(0) => {
                FetchError::RateLimited {
                    retry_after: header_u64("retry-after"),
                }
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Unauthorized {
                status: status.as_u16(),
            },
            _ => FetchError::Api {
                status: status.as_u16(),
            },
        }
    }
}

/// A source of repository metadata.
#[async_trait]
pub trait RepositoryProvider: Send + Sync {
    /// Stable identifier stored as the record `source`
    fn id(&self) -> &'static str;

    /// Human-readable name used in messages
    fn label(&self) -> &'static str;

    /// Whether `url` belongs to this provider. Pure, never fails.
    fn validate(&self, url: &str) -> bool;

    /// Example of an accepted URL
    fn validate_help_text(&self) -> &'static str;

    async fn fetch(&self, url: &str) -> Result<RepositoryMetadata, FetchError>;
}

/// Fetches metadata, reporting any failure to `messenger` and returning `None`.
pub async fn get_repo(
    provider: &dyn RepositoryProvider,
    url: &str,
    messenger: &dyn Messenger,
) -> Option<RepositoryMetadata> {
    match provider.fetch(url).await {
        Ok(metadata) => {
            debug!(provider = provider.id(), url, key = %metadata.key, "Fetched repository metadata");
            counter!("provider_fetch_success_total", "provider" => provider.id()).increment(1);
            Some(metadata)
        }
        Err(err) => {
            warn!(
                provider = provider.id(),
                url,
                kind = err.kind(),
                error = %err,
                "Repository fetch failed"
            );
            counter!(
                "provider_fetch_failures_total",
                "provider" => provider.id(),
                "kind" => err.kind()
            )
            .increment(1);
            messenger.add_error(format!("{} error: {}", provider.label(), err));
            None
        }
    }
}

/// Shared HTTP client for provider calls.
pub fn build_http_client(config: &AppConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(config.fetch_timeout_ms))
        .user_agent(concat!("repo-sync/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Resolves the credential for `provider`, treating absence as an error.
pub(crate) async fn require_credential(
    secrets: &Arc<dyn SecretStore>,
    provider: &'static str,
) -> Result<Credential, FetchError> {
    secrets
        .get_credential(provider)
        .await
        .map_err(|err| FetchError::Credentials {
            provider,
            reason: err.to_string(),
        })?
        .ok_or(FetchError::Credentials {
            provider,
            reason: "none configured".to_string(),
        })
}

/// `(namespace, name)` from the first two path segments of a hosted
/// repository URL, with any `.git` suffix removed.
pub(crate) fn namespace_and_name(url: &str) -> Result<(String, String), FetchError> {
    let invalid = || FetchError::InvalidUrl {
        url: url.to_string(),
    };
    let parsed = url::Url::parse(url).map_err(|_| invalid())?;
    let mut segments = parsed
        .path_segments()
        .ok_or_else(invalid)?
        .filter(|s| !s.is_empty());

    let namespace = segments.next().ok_or_else(invalid)?;
    let name = segments.next().ok_or_else(invalid)?;
    let name = name.strip_suffix(".git").unwrap_or(name);
    if name.is_empty() {
        return Err(invalid());
    }
    Ok((namespace.to_string(), name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::BufferedMessenger;

    struct Failing;

    #[async_trait]
    impl RepositoryProvider for Failing {
        fn id(&self) -> &'static str {
            "failing"
        }
        fn label(&self) -> &'static str {
            "Failing"
        }
        fn validate(&self, _url: &str) -> bool {
            true
        }
        fn validate_help_text(&self) -> &'static str {
            ""
        }
        async fn fetch(&self, _url: &str) -> Result<RepositoryMetadata, FetchError> {
            Err(FetchError::Api { status: 502 })
        }
    }

    #[tokio::test]
    async fn get_repo_collapses_failures_and_reports_them() {
        let messenger = BufferedMessenger::new();
        let result = get_repo(&Failing, "https://example.com/a/b", &messenger).await;

        assert!(result.is_none());
        assert_eq!(
            messenger.errors(),
            vec!["Failing error: API request failed with status 502".to_string()]
        );
    }

    #[test]
    fn namespace_and_name_reads_first_two_segments() {
        assert_eq!(
            namespace_and_name("https://github.com/acme/widget/tree/main").unwrap(),
            ("acme".to_string(), "widget".to_string())
        );
        assert_eq!(
            namespace_and_name("https://gitlab.com/acme/widget.git").unwrap(),
            ("acme".to_string(), "widget".to_string())
        );
        assert!(matches!(
            namespace_and_name("https://github.com/acme"),
            Err(FetchError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn kinds_distinguish_timeouts() {
        let timeout = FetchError::Network {
            details: "deadline".into(),
            timed_out: true,
        };
        assert_eq!(timeout.kind(), "timeout");
        assert_eq!(
            FetchError::RateLimited { retry_after: Some(5) }.to_string(),
            "rate limited (retry after 5s)"
        );
    }
}
