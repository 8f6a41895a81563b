//! Provider credential resolution.
//!
//! Providers never hold credentials themselves. They ask an injected
//! [`SecretStore`] on every authenticated call.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;
use zeroize::Zeroizing;

use crate::config::AppConfig;
use crate::crypto::{self, CryptoError, CryptoKey};
use crate::repositories::CredentialRepository;

/// API credential for one provider.
#[derive(Clone)]
pub struct Credential {
    /// Present for providers that authenticate with basic auth
    pub username: Option<String>,
    pub token: Zeroizing<String>,
}

impl Credential {
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            username: None,
            token: Zeroizing::new(token.into()),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("credential storage unavailable: {0}")]
    Storage(String),
    #[error("credential for '{provider_id}' could not be encrypted: {source}")]
    Encrypt {
        provider_id: String,
        source: CryptoError,
    },
    #[error("stored credential for '{provider_id}' could not be decrypted: {source}")]
    Decrypt {
        provider_id: String,
        source: CryptoError,
    },
    #[error("no crypto key configured; set REPO_SYNC_CRYPTO_KEY")]
    MissingKey,
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_credential(&self, provider_id: &str) -> Result<Option<Credential>, SecretError>;
}

/// Credentials read from `REPO_SYNC_GITHUB_*` / `REPO_SYNC_GITLAB_*` settings.
#[derive(Debug, Default, Clone)]
pub struct ConfigSecretStore {
    github: Option<Credential>,
    gitlab: Option<Credential>,
}

impl ConfigSecretStore {
    pub fn from_config(config: &AppConfig) -> Self {
        let github = config.github_token.as_ref().map(|token| {
            let credential = Credential::token(token.clone());
            match &config.github_username {
                Some(username) => credential.with_username(username.clone()),
                None => credential,
            }
        });
        let gitlab = config.gitlab_token.clone().map(Credential::token);
        Self { github, gitlab }
    }
}

#[async_trait]
impl SecretStore for ConfigSecretStore {
    async fn get_credential(&self, provider_id: &str) -> Result<Option<Credential>, SecretError> {
        Ok(match provider_id {
            "github" => self.github.clone(),
            "gitlab" => self.gitlab.clone(),
            _ => None,
        })
    }
}

/// Credentials stored encrypted in the provider_credentials table.
pub struct DatabaseSecretStore {
    repository: CredentialRepository,
    key: Option<CryptoKey>,
}

impl DatabaseSecretStore {
    pub fn new(repository: CredentialRepository, key: Option<CryptoKey>) -> Self {
        Self { repository, key }
    }

    /// Encrypts and stores a credential.
    pub async fn store(&self, provider_id: &str, credential: &Credential) -> Result<(), SecretError> {
        let key = self.key.as_ref().ok_or(SecretError::MissingKey)?;
        let sealed = crypto::seal_token(key, provider_id, &credential.token).map_err(|source| {
            SecretError::Encrypt {
                provider_id: provider_id.to_string(),
                source,
            }
        })?;
        self.repository
            .upsert(provider_id, credential.username.clone(), sealed)
            .await
            .map_err(|e| SecretError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl SecretStore for DatabaseSecretStore {
    async fn get_credential(&self, provider_id: &str) -> Result<Option<Credential>, SecretError> {
        let Some(row) = self
            .repository
            .find(provider_id)
            .await
            .map_err(|e| SecretError::Storage(e.to_string()))?
        else {
            return Ok(None);
        };

        let key = self.key.as_ref().ok_or(SecretError::MissingKey)?;
        let token = crypto::open_token(key, provider_id, &row.token_ciphertext).map_err(
            |source| SecretError::Decrypt {
                provider_id: provider_id.to_string(),
                source,
            },
        )?;

        Ok(Some(Credential {
            username: row.username,
            token,
        }))
    }
}

/// Asks each store in turn and returns the first credential found.
///
/// A store that holds a credential it cannot open without a crypto key is
/// skipped so later stores still get a chance.
pub struct ChainedSecretStore {
    stores: Vec<Arc<dyn SecretStore>>,
}

impl ChainedSecretStore {
    pub fn new(stores: Vec<Arc<dyn SecretStore>>) -> Self {
        Self { stores }
    }
}

#[async_trait]
impl SecretStore for ChainedSecretStore {
    async fn get_credential(&self, provider_id: &str) -> Result<Option<Credential>, SecretError> {
        for store in &self.stores {
            match store.get_credential(provider_id).await {
                Ok(Some(credential)) => return Ok(Some(credential)),
                Ok(None) => {}
                Err(SecretError::MissingKey) => {
                    warn!(provider_id, "Stored credential skipped: no crypto key configured");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }
}
