//! # Data Models
//!
//! SeaORM entities for owners, their declared URLs, synchronized
//! repositories, provider credentials and queued reconcile jobs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod owner;
pub mod owner_repository_url;
pub mod provider_credential;
pub mod reconcile_job;
pub mod repository;

pub use owner::Entity as Owner;
pub use owner_repository_url::Entity as OwnerRepositoryUrl;
pub use provider_credential::Entity as ProviderCredential;
pub use reconcile_job::Entity as ReconcileJob;
pub use repository::Entity as Repository;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "repo-sync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
