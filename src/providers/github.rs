//! GitHub provider
//!
//! Reads repository metadata from the GitHub REST API
//! (`GET /repos/{owner}/{repo}`).

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};

use super::registry::ProviderRegistry;
use super::{FetchError, RepositoryProvider, namespace_and_name, require_credential};
use crate::domain::RepositoryMetadata;
use crate::secrets::SecretStore;

pub const GITHUB_PROVIDER_ID: &str = "github";

const GITHUB_ACCEPT: &str = "application/vnd.github+json";

static GITHUB_URL: OnceLock<Option<Regex>> = OnceLock::new();

fn url_pattern() -> Option<&'static Regex> {
    GITHUB_URL
        .get_or_init(|| Regex::new(r"^https://(www\.)?github\.com/[a-zA-Z0-9_-]+/[a-zA-Z0-9_-]+").ok())
        .as_ref()
}

/// Subset of the GitHub repository payload we map.
#[derive(Debug, Deserialize)]
struct GitHubRepository {
    full_name: String,
    name: String,
    description: Option<String>,
    #[serde(default)]
    open_issues_count: u64,
    html_url: String,
}

pub struct GitHubProvider {
    client: reqwest::Client,
    api_base: String,
    secrets: Arc<dyn SecretStore>,
}

impl GitHubProvider {
    pub fn new(client: reqwest::Client, api_base: String, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            secrets,
        }
    }
}

#[async_trait]
impl RepositoryProvider for GitHubProvider {
    fn id(&self) -> &'static str {
        GITHUB_PROVIDER_ID
    }

    fn label(&self) -> &'static str {
        "GitHub"
    }

    fn validate(&self, url: &str) -> bool {
        url_pattern().is_some_and(|re| re.is_match(url))
    }

    fn validate_help_text(&self) -> &'static str {
        "https://github.com/vendor/name"
    }

    async fn fetch(&self, url: &str) -> Result<RepositoryMetadata, FetchError> {
        let (owner, name) = namespace_and_name(url)?;
        let credential = require_credential(&self.secrets, GITHUB_PROVIDER_ID).await?;

        let endpoint = format!("{}/repos/{}/{}", self.api_base, owner, name);
        let request = self.client.get(&endpoint).header(ACCEPT, GITHUB_ACCEPT);
        let request = match &credential.username {
            Some(username) => request.basic_auth(username, Some(credential.token.as_str())),
            None => request.bearer_auth(credential.token.as_str()),
        };

        let response = request.send().await.map_err(FetchError::from_reqwest)?;
        if !response.status().is_success() {
            return Err(FetchError::from_status(&response));
        }

        let repo: GitHubRepository = response.json().await.map_err(FetchError::from_reqwest)?;
        Ok(RepositoryMetadata {
            key: repo.full_name,
            label: repo.name,
            description: repo.description,
            open_issue_count: repo.open_issues_count,
            source: GITHUB_PROVIDER_ID.to_string(),
            url: repo.html_url,
        })
    }
}

/// Register the GitHub provider with the registry
pub fn register_github_provider(registry: &mut ProviderRegistry, provider: Arc<GitHubProvider>) {
    registry.register(provider);
}
