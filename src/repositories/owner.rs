//! Owner repository for database operations
//!
//! Implements [`OwnerDirectory`] over the owners and owner_repository_urls
//! tables.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{OwnerDirectory, StoreError};
use crate::models::{
    owner::{self, Entity as Owner},
    owner_repository_url::{self, Entity as OwnerRepositoryUrl},
    repository::{self, Entity as Repository},
};

/// Repository for owner and declaration database operations
#[derive(Debug, Clone)]
pub struct OwnerRepository {
    pub db: Arc<DatabaseConnection>,
}

impl OwnerRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Creates the owner when missing, updating the display name if one is given.
    pub async fn ensure_owner(&self, owner_id: i64, name: Option<&str>) -> Result<(), StoreError> {
        ensure_owner_in(&*self.db, owner_id, name).await
    }

    pub async fn find(&self, owner_id: i64) -> Result<Option<owner::Model>, StoreError> {
        Ok(Owner::find_by_id(owner_id).one(&*self.db).await?)
    }
}

async fn ensure_owner_in<C: ConnectionTrait>(
    conn: &C,
    owner_id: i64,
    name: Option<&str>,
) -> Result<(), StoreError> {
    match Owner::find_by_id(owner_id).one(conn).await? {
        Some(existing) => {
            if let Some(name) = name
                && existing.name.as_deref() != Some(name)
            {
                let mut active: owner::ActiveModel = existing.into();
                active.name = Set(Some(name.to_string()));
                active.update(conn).await?;
            }
        }
        None => {
            owner::ActiveModel {
                id: Set(owner_id),
                name: Set(name.map(str::to_string)),
                created_at: Set(Utc::now().fixed_offset()),
            }
            .insert(conn)
            .await?;
        }
    }
    Ok(())
}

#[async_trait]
impl OwnerDirectory for OwnerRepository {
    async fn owner_exists(&self, owner_id: i64) -> Result<bool, StoreError> {
        Ok(self.find(owner_id).await?.is_some())
    }

    async fn declared_urls(&self, owner_id: i64) -> Result<Vec<String>, StoreError> {
        let rows = OwnerRepositoryUrl::find()
            .filter(owner_repository_url::Column::OwnerId.eq(owner_id))
            .order_by_asc(owner_repository_url::Column::Position)
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(|row| row.url).collect())
    }

    async fn replace_declared_urls(
        &self,
        owner_id: i64,
        urls: &[String],
    ) -> Result<(), StoreError> {
        let txn = self.db.begin().await?;
        ensure_owner_in(&txn, owner_id, None).await?;

        OwnerRepositoryUrl::delete_many()
            .filter(owner_repository_url::Column::OwnerId.eq(owner_id))
            .exec(&txn)
            .await?;

        let now = Utc::now().fixed_offset();
        let rows: Vec<owner_repository_url::ActiveModel> = urls
            .iter()
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
            .enumerate()
            .map(|(position, url)| owner_repository_url::ActiveModel {
                owner_id: Set(owner_id),
                position: Set(position as i32),
                url: Set(url.to_string()),
                created_at: Set(now),
            })
            .collect();

        if !rows.is_empty() {
            OwnerRepositoryUrl::insert_many(rows).exec(&txn).await?;
        }

        txn.commit().await?;
        tracing::info!(owner_id, urls = urls.len(), "Replaced declared repository urls");
        Ok(())
    }

    async fn reconcilable_owners(&self) -> Result<Vec<i64>, StoreError> {
        let declaring: Vec<i64> = OwnerRepositoryUrl::find()
            .select_only()
            .column(owner_repository_url::Column::OwnerId)
            .distinct()
            .into_tuple()
            .all(&*self.db)
            .await?;

        let holding: Vec<i64> = Repository::find()
            .select_only()
            .column(repository::Column::OwnerId)
            .distinct()
            .into_tuple()
            .all(&*self.db)
            .await?;

        let owners: BTreeSet<i64> = declaring.into_iter().chain(holding).collect();
        Ok(owners.into_iter().collect())
    }

    async fn has_declarations(&self) -> Result<bool, StoreError> {
        let count = OwnerRepositoryUrl::find().count(&*self.db).await?;
        Ok(count > 0)
    }
}
