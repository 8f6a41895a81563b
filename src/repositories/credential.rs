//! Provider credential repository
//!
//! Stores encrypted provider tokens. Encryption and decryption happen in
//! [`crate::secrets::DatabaseSecretStore`]; this layer only moves bytes.

use anyhow::Result;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use std::sync::Arc;

use crate::models::provider_credential::{self, Entity as ProviderCredential};

#[derive(Debug, Clone)]
pub struct CredentialRepository {
    pub db: Arc<DatabaseConnection>,
}

impl CredentialRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find(&self, provider_id: &str) -> Result<Option<provider_credential::Model>> {
        let credential = ProviderCredential::find_by_id(provider_id.to_string())
            .one(&*self.db)
            .await?;
        Ok(credential)
    }

    /// Inserts or replaces the credential for `provider_id`.
    pub async fn upsert(
        &self,
        provider_id: &str,
        username: Option<String>,
        token_ciphertext: Vec<u8>,
    ) -> Result<provider_credential::Model> {
        let now = Utc::now().fixed_offset();

        let model = match self.find(provider_id).await? {
            Some(existing) => {
                let mut active: provider_credential::ActiveModel = existing.into();
                active.username = Set(username);
                active.token_ciphertext = Set(token_ciphertext);
                active.updated_at = Set(now);
                active.update(&*self.db).await?
            }
            None => {
                provider_credential::ActiveModel {
                    provider_id: Set(provider_id.to_string()),
                    username: Set(username),
                    token_ciphertext: Set(token_ciphertext),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&*self.db)
                .await?
            }
        };

        tracing::info!(provider_id, "Stored provider credential");
        Ok(model)
    }

    /// Returns true when a credential was removed.
    pub async fn delete(&self, provider_id: &str) -> Result<bool> {
        let result = ProviderCredential::delete_by_id(provider_id.to_string())
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }
}
