//! Repository entity model
//!
//! This module contains the SeaORM entity model for the repositories table,
//! the locally persisted counterpart of a remote repository's metadata.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Persisted repository record
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "repositories")]
pub struct Model {
    /// Storage identity assigned at creation
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owner the record belongs to
    pub owner_id: i64,

    /// Provider-scoped stable key such as `acme/widget`
    pub machine_name: String,

    /// Short display name
    pub label: String,

    pub description: Option<String>,

    pub open_issue_count: i64,

    /// Identifier of the provider that produced the record
    pub source: String,

    /// Canonical remote URL
    pub url: String,

    /// Hex SHA-256 fingerprint of the metadata fields
    pub content_hash: String,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
