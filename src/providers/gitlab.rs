//! GitLab provider
//!
//! Reads project metadata from the GitLab v4 API using a personal access token.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};

use super::registry::ProviderRegistry;
use super::{FetchError, RepositoryProvider, namespace_and_name, require_credential};
use crate::domain::RepositoryMetadata;
use crate::secrets::SecretStore;

pub const GITLAB_PROVIDER_ID: &str = "gitlab";

static GITLAB_URL: OnceLock<Option<Regex>> = OnceLock::new();

fn url_pattern() -> Option<&'static Regex> {
    GITLAB_URL
        .get_or_init(|| Regex::new(r"^https://gitlab\.com/[a-zA-Z0-9_-]+/[a-zA-Z0-9_-]+").ok())
        .as_ref()
}

#[derive(Debug, Deserialize)]
struct GitLabProject {
    path_with_namespace: String,
    name: String,
    description: Option<String>,
    /// Omitted when the project has issues disabled
    #[serde(default)]
    open_issues_count: u64,
    web_url: String,
}

pub struct GitLabProvider {
    client: reqwest::Client,
    api_base: String,
    secrets: Arc<dyn SecretStore>,
}

impl GitLabProvider {
    pub fn new(client: reqwest::Client, api_base: String, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            secrets,
        }
    }
}

#[async_trait]
impl RepositoryProvider for GitLabProvider {
    fn id(&self) -> &'static str {
        GITLAB_PROVIDER_ID
    }

    fn label(&self) -> &'static str {
        "GitLab"
    }

    fn validate(&self, url: &str) -> bool {
        url_pattern().is_some_and(|re| re.is_match(url))
    }

    fn validate_help_text(&self) -> &'static str {
        "https://gitlab.com/vendor/name"
    }

    async fn fetch(&self, url: &str) -> Result<RepositoryMetadata, FetchError> {
        let (namespace, name) = namespace_and_name(url)?;
        let credential = require_credential(&self.secrets, GITLAB_PROVIDER_ID).await?;

        // Project ids may be the url-encoded full path
        let endpoint = format!(
            "{}/api/v4/projects/{}%2F{}",
            self.api_base, namespace, name
        );
        let response = self
            .client
            .get(&endpoint)
            .header("PRIVATE-TOKEN", credential.token.as_str())
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(FetchError::from_status(&response));
        }

        let project: GitLabProject = response.json().await.map_err(FetchError::from_reqwest)?;
        Ok(RepositoryMetadata {
            key: project.path_with_namespace,
            label: project.name,
            description: project.description,
            open_issue_count: project.open_issues_count,
            source: GITLAB_PROVIDER_ID.to_string(),
            url: project.web_url,
        })
    }
}

/// Register the GitLab provider with the registry
pub fn register_gitlab_provider(registry: &mut ProviderRegistry, provider: Arc<GitLabProvider>) {
    registry.register(provider);
}
