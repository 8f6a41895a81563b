//! Core repository types shared by providers, storage and the reconciler.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::repository;

/// Snapshot of one remote repository as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RepositoryMetadata {
    /// Provider-scoped stable key (`acme/widget`, manifest top-level key)
    pub key: String,
    pub label: String,
    pub description: Option<String>,
    pub open_issue_count: u64,
    /// Identifier of the provider that produced the snapshot
    pub source: String,
    /// Canonical remote URL
    pub url: String,
}

/// Field order is fixed here, so the digest never depends on how a
/// snapshot was assembled.
#[derive(Serialize)]
struct Fingerprint<'a> {
    key: &'a str,
    label: &'a str,
    description: Option<&'a str>,
    open_issue_count: u64,
    source: &'a str,
    url: &'a str,
}

impl RepositoryMetadata {
    /// Hex SHA-256 digest over every metadata field.
    pub fn content_hash(&self) -> String {
        let fingerprint = Fingerprint {
            key: &self.key,
            label: &self.label,
            description: self.description.as_deref(),
            open_issue_count: self.open_issue_count,
            source: &self.source,
            url: &self.url,
        };
        // Serializing a struct of strings and integers cannot fail
        let encoded = serde_json::to_vec(&fingerprint).unwrap_or_default();
        hex::encode(Sha256::digest(&encoded))
    }
}

/// Locally persisted repository record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RepositoryRecord {
    pub id: Uuid,
    pub owner_id: i64,
    pub key: String,
    pub label: String,
    pub description: Option<String>,
    pub open_issue_count: u64,
    pub source: String,
    pub url: String,
    pub content_hash: String,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<FixedOffset>,
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: DateTime<FixedOffset>,
}

impl From<repository::Model> for RepositoryRecord {
    fn from(model: repository::Model) -> Self {
        Self {
            id: model.id,
            owner_id: model.owner_id,
            key: model.machine_name,
            label: model.label,
            description: model.description,
            open_issue_count: u64::try_from(model.open_issue_count).unwrap_or(0),
            source: model.source,
            url: model.url,
            content_hash: model.content_hash,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Created,
    Updated,
    Deleted,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Created => "created",
            ChangeAction::Updated => "updated",
            ChangeAction::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One applied mutation, returned by the reconciler for the caller to dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChangeEvent {
    pub action: ChangeAction,
    pub record: RepositoryRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget() -> RepositoryMetadata {
        RepositoryMetadata {
            key: "acme/widget".to_string(),
            label: "widget".to_string(),
            description: Some("A widget".to_string()),
            open_issue_count: 3,
            source: "github".to_string(),
            url: "https://github.com/acme/widget".to_string(),
        }
    }

    #[test]
    fn hash_is_stable_for_identical_values() {
        assert_eq!(widget().content_hash(), widget().content_hash());
        assert_eq!(widget().content_hash().len(), 64);
    }

    #[test]
    fn hash_ignores_input_field_order() {
        let reordered: RepositoryMetadata = serde_json::from_str(
            r#"{
                "url": "https://github.com/acme/widget",
                "source": "github",
                "open_issue_count": 3,
                "description": "A widget",
                "label": "widget",
                "key": "acme/widget"
            }"#,
        )
        .expect("parses");

        assert_eq!(reordered.content_hash(), widget().content_hash());
    }

    #[test]
    fn hash_changes_with_any_field() {
        let base = widget().content_hash();

        let mut issues = widget();
        issues.open_issue_count = 4;
        assert_ne!(issues.content_hash(), base);

        let mut description = widget();
        description.description = None;
        assert_ne!(description.content_hash(), base);

        let mut source = widget();
        source.source = "gitlab".to_string();
        assert_ne!(source.content_hash(), base);
    }
}
