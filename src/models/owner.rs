//! Owner entity model
//!
//! Site identities that declare repository URLs and own repository records.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "owners")]
pub struct Model {
    /// Owner identifier; 0 is the anonymous owner and never stored
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,

    pub name: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::owner_repository_url::Entity")]
    RepositoryUrls,
}

impl Related<super::owner_repository_url::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RepositoryUrls.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
