//! Provider registry
//!
//! Holds every registered provider keyed by id and resolves the configured,
//! ordered set of enabled providers.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use super::{
    GitHubProvider, GitLabProvider, RepositoryProvider, YmlRemoteProvider,
    register_github_provider, register_gitlab_provider, register_yml_remote_provider,
};
use crate::config::AppConfig;
use crate::secrets::SecretStore;

/// Error type for registry operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("Provider '{id}' is enabled but not registered")]
    UnknownProvider { id: String },
}

/// Public description of a provider.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProviderInfo {
    /// Provider identifier, e.g. `github`
    pub id: String,
    pub label: String,
    /// Example of an accepted URL
    pub help_text: String,
    pub enabled: bool,
}

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn RepositoryProvider>>,
    enabled: Vec<String>,
}

impl ProviderRegistry {
    /// Create an empty registry enabling `enabled` in the given order
    pub fn new(enabled: Vec<String>) -> Self {
        Self {
            providers: HashMap::new(),
            enabled,
        }
    }

    /// Registers the built-in providers sharing one HTTP client and secret store.
    pub fn from_config(
        config: &AppConfig,
        client: reqwest::Client,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        let mut registry = Self::new(config.enabled_providers.clone());

        register_github_provider(
            &mut registry,
            Arc::new(GitHubProvider::new(
                client.clone(),
                config.github_api_base.clone(),
                secrets.clone(),
            )),
        );
        register_gitlab_provider(
            &mut registry,
            Arc::new(GitLabProvider::new(
                client.clone(),
                config.gitlab_api_base.clone(),
                secrets,
            )),
        );
        register_yml_remote_provider(&mut registry, Arc::new(YmlRemoteProvider::new(client)));

        info!(
            registered = ?registry.registered_ids(),
            enabled = ?registry.enabled_ids(),
            "Provider registry initialized"
        );
        registry
    }

    /// Adds or replaces a provider under its own id
    pub fn register(&mut self, provider: Arc<dyn RepositoryProvider>) {
        self.providers.insert(provider.id().to_string(), provider);
    }

    /// Enabled ids in configured order
    pub fn enabled_ids(&self) -> &[String] {
        &self.enabled
    }

    /// Registered ids, sorted for stable output
    pub fn registered_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn RepositoryProvider>, RegistryError> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownProvider { id: id.to_string() })
    }

    /// Enabled providers in configured order. Fails on the first id that
    /// was never registered.
    pub fn enabled(&self) -> Result<Vec<Arc<dyn RepositoryProvider>>, RegistryError> {
        self.enabled.iter().map(|id| self.get(id)).collect()
    }

    /// Registered providers first in enabled order, then the disabled ones by id.
    pub fn describe(&self) -> Vec<ProviderInfo> {
        let mut described: Vec<ProviderInfo> = self
            .enabled
            .iter()
            .filter_map(|id| self.providers.get(id))
            .map(|p| info_for(p.as_ref(), true))
            .collect();

        described.extend(
            self.registered_ids()
                .into_iter()
                .filter(|id| !self.enabled.iter().any(|e| e == id))
                .filter_map(|id| self.providers.get(id))
                .map(|p| info_for(p.as_ref(), false)),
        );
        described
    }
}

fn info_for(provider: &dyn RepositoryProvider, enabled: bool) -> ProviderInfo {
    ProviderInfo {
        id: provider.id().to_string(),
        label: provider.label().to_string(),
        help_text: provider.validate_help_text().to_string(),
        enabled,
    }
}
