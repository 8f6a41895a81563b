//! # Repository record storage
//!
//! SeaORM implementation of [`RepositoryStore`] over the repositories table.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use super::{RepositoryStore, StoreError};
use crate::domain::{RepositoryMetadata, RepositoryRecord};
use crate::models::repository::{ActiveModel, Column, Entity as Repository};

/// Repository records backed by the application database
#[derive(Debug, Clone)]
pub struct SqlRepositoryStore {
    pub db: Arc<DatabaseConnection>,
}

impl SqlRepositoryStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn issue_count(metadata: &RepositoryMetadata) -> i64 {
    i64::try_from(metadata.open_issue_count).unwrap_or(i64::MAX)
}

#[async_trait]
impl RepositoryStore for SqlRepositoryStore {
    async fn find_by_owner_and_key(
        &self,
        owner_id: i64,
        key: &str,
        source: &str,
    ) -> Result<Option<RepositoryRecord>, StoreError> {
        let record = Repository::find()
            .filter(Column::OwnerId.eq(owner_id))
            .filter(Column::MachineName.eq(key))
            .filter(Column::Source.eq(source))
            .one(&*self.db)
            .await?;
        Ok(record.map(RepositoryRecord::from))
    }

    async fn find_all_by_owner(&self, owner_id: i64) -> Result<Vec<RepositoryRecord>, StoreError> {
        let records = Repository::find()
            .filter(Column::OwnerId.eq(owner_id))
            .order_by_asc(Column::MachineName)
            .order_by_asc(Column::Source)
            .all(&*self.db)
            .await?;
        Ok(records.into_iter().map(RepositoryRecord::from).collect())
    }

    async fn create(
        &self,
        owner_id: i64,
        metadata: &RepositoryMetadata,
        content_hash: &str,
    ) -> Result<RepositoryRecord, StoreError> {
        let now = Utc::now().fixed_offset();
        let model = ActiveModel {
            id: Set(Uuid::new_v4()),
            owner_id: Set(owner_id),
            machine_name: Set(metadata.key.clone()),
            label: Set(metadata.label.clone()),
            description: Set(metadata.description.clone()),
            open_issue_count: Set(issue_count(metadata)),
            source: Set(metadata.source.clone()),
            url: Set(metadata.url.clone()),
            content_hash: Set(content_hash.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;
        Ok(model.into())
    }

    async fn update(
        &self,
        record_id: Uuid,
        metadata: &RepositoryMetadata,
        content_hash: &str,
    ) -> Result<RepositoryRecord, StoreError> {
        let existing = Repository::find_by_id(record_id)
            .one(&*self.db)
            .await?
            .ok_or(StoreError::RecordNotFound(record_id))?;

        let mut active: ActiveModel = existing.into();
        active.machine_name = Set(metadata.key.clone());
        active.label = Set(metadata.label.clone());
        active.description = Set(metadata.description.clone());
        active.open_issue_count = Set(issue_count(metadata));
        active.source = Set(metadata.source.clone());
        active.url = Set(metadata.url.clone());
        active.content_hash = Set(content_hash.to_string());
        active.updated_at = Set(Utc::now().fixed_offset());

        let model = active.update(&*self.db).await?;
        Ok(model.into())
    }

    async fn delete(&self, record_id: Uuid) -> Result<(), StoreError> {
        let result = Repository::delete_by_id(record_id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(StoreError::RecordNotFound(record_id));
        }
        Ok(())
    }

    async fn find_by_url_excluding_owner(
        &self,
        url: &str,
        owner_id: i64,
    ) -> Result<Vec<RepositoryRecord>, StoreError> {
        let records = Repository::find()
            .filter(Column::Url.eq(url))
            .filter(Column::OwnerId.ne(owner_id))
            .all(&*self.db)
            .await?;
        Ok(records.into_iter().map(RepositoryRecord::from).collect())
    }
}
