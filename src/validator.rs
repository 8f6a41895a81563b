//! Validation of repository URLs submitted by an owner.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};
use utoipa::ToSchema;

use crate::domain::RepositoryMetadata;
use crate::notify::Messenger;
use crate::providers::{ProviderRegistry, RegistryError, get_repo};
use crate::repositories::{RepositoryStore, StoreError};

/// One problem found with a submitted URL.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    #[error("The repository url {url} is not valid.")]
    InvalidUrl { url: String },
    #[error("The repository at the url {url} was not found.")]
    NotFound { url: String },
    #[error("The repository at {url} has already been added by another user.")]
    ClaimedByAnotherOwner { url: String },
    #[error("The repository at {url} could not be checked for uniqueness: {reason}")]
    UniquenessCheckFailed { url: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("There are no enabled repository providers")]
    NoProvidersEnabled,
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Outcome of validating a batch of URLs.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
    /// Metadata fetched for URLs that passed every check
    pub accepted: Vec<RepositoryMetadata>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// All issue messages joined by a space; empty when valid.
    pub fn summary(&self) -> String {
        self.issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// True when no record with the same canonical url belongs to another owner.
pub async fn is_unique(
    store: &dyn RepositoryStore,
    metadata: &RepositoryMetadata,
    owner_id: i64,
) -> Result<bool, StoreError> {
    let others = store
        .find_by_url_excluding_owner(&metadata.url, owner_id)
        .await?;
    Ok(others.is_empty())
}

#[derive(Clone)]
pub struct UrlValidator {
    registry: Arc<ProviderRegistry>,
    store: Arc<dyn RepositoryStore>,
    messenger: Arc<dyn Messenger>,
}

impl UrlValidator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        store: Arc<dyn RepositoryStore>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            registry,
            store,
            messenger,
        }
    }

    /// Same validator reporting fetch failures to `messenger`.
    pub fn with_messenger(&self, messenger: Arc<dyn Messenger>) -> Self {
        Self {
            messenger,
            ..self.clone()
        }
    }

    /// Help texts of the enabled providers, space-joined.
    pub fn help_text(&self) -> Result<String, RegistryError> {
        let providers = self.registry.enabled()?;
        Ok(providers
            .iter()
            .map(|p| p.validate_help_text())
            .collect::<Vec<_>>()
            .join(" "))
    }

    #[instrument(skip(self, urls), fields(urls = urls.len()))]
    pub async fn validate_urls(
        &self,
        urls: &[String],
        submitter: i64,
    ) -> Result<ValidationReport, ValidatorError> {
        let providers = self.registry.enabled()?;
        if providers.is_empty() {
            return Err(ValidatorError::NoProvidersEnabled);
        }

        let mut report = ValidationReport::default();
        for url in urls.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
            let mut matched = false;

            for provider in providers.iter().filter(|p| p.validate(url)) {
                matched = true;
                let Some(metadata) = get_repo(provider.as_ref(), url, self.messenger.as_ref()).await
                else {
                    report.issues.push(ValidationIssue::NotFound {
                        url: url.to_string(),
                    });
                    continue;
                };

                match is_unique(self.store.as_ref(), &metadata, submitter).await {
                    Ok(true) => report.accepted.push(metadata),
                    Ok(false) => report.issues.push(ValidationIssue::ClaimedByAnotherOwner {
                        url: url.to_string(),
                    }),
                    Err(err) => report.issues.push(ValidationIssue::UniquenessCheckFailed {
                        url: url.to_string(),
                        reason: err.to_string(),
                    }),
                }
            }

            if !matched {
                report.issues.push(ValidationIssue::InvalidUrl {
                    url: url.to_string(),
                });
            }
        }

        debug!(
            issues = report.issues.len(),
            accepted = report.accepted.len(),
            "Validated repository urls"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_joins_messages_with_a_space() {
        let report = ValidationReport {
            issues: vec![
                ValidationIssue::InvalidUrl {
                    url: "ftp://nope".into(),
                },
                ValidationIssue::NotFound {
                    url: "https://github.com/acme/gone".into(),
                },
            ],
            accepted: Vec::new(),
        };

        assert!(!report.is_valid());
        assert_eq!(
            report.summary(),
            "The repository url ftp://nope is not valid. The repository at the url https://github.com/acme/gone was not found."
        );
        assert_eq!(ValidationReport::default().summary(), "");
    }
}
