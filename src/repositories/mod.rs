//! # Repository Layer
//!
//! Storage traits consumed by the reconciliation engine, and their SeaORM
//! implementations.

use async_trait::async_trait;
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{RepositoryMetadata, RepositoryRecord};

pub mod credential;
pub mod owner;
pub mod reconcile_job;
pub mod repository;

pub use credential::CredentialRepository;
pub use owner::OwnerRepository;
pub use reconcile_job::ReconcileJobRepository;
pub use repository::SqlRepositoryStore;

/// Storage-layer failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("repository record {0} not found")]
    RecordNotFound(Uuid),
}

/// Persistence of repository records.
///
/// Records are addressed for reconciliation by `(owner_id, key, source)`.
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    async fn find_by_owner_and_key(
        &self,
        owner_id: i64,
        key: &str,
        source: &str,
    ) -> Result<Option<RepositoryRecord>, StoreError>;

    async fn find_all_by_owner(&self, owner_id: i64) -> Result<Vec<RepositoryRecord>, StoreError>;

    async fn create(
        &self,
        owner_id: i64,
        metadata: &RepositoryMetadata,
        content_hash: &str,
    ) -> Result<RepositoryRecord, StoreError>;

    /// Overwrites every metadata field and the stored hash in place.
    async fn update(
        &self,
        record_id: Uuid,
        metadata: &RepositoryMetadata,
        content_hash: &str,
    ) -> Result<RepositoryRecord, StoreError>;

    async fn delete(&self, record_id: Uuid) -> Result<(), StoreError>;

    /// Records sharing `url` that belong to anyone but `owner_id`.
    async fn find_by_url_excluding_owner(
        &self,
        url: &str,
        owner_id: i64,
    ) -> Result<Vec<RepositoryRecord>, StoreError>;
}

/// Owner identities and their declared repository URLs.
#[async_trait]
pub trait OwnerDirectory: Send + Sync {
    async fn owner_exists(&self, owner_id: i64) -> Result<bool, StoreError>;

    /// Declared URLs in submission order.
    async fn declared_urls(&self, owner_id: i64) -> Result<Vec<String>, StoreError>;

    /// Replaces the declaration, creating the owner when unknown.
    async fn replace_declared_urls(&self, owner_id: i64, urls: &[String])
    -> Result<(), StoreError>;

    /// Owners with at least one declared URL or persisted record, ascending.
    async fn reconcilable_owners(&self) -> Result<Vec<i64>, StoreError>;

    /// True while any owner still declares a URL.
    async fn has_declarations(&self) -> Result<bool, StoreError>;
}
