//! Migration to create the owner_repository_urls table.
//!
//! Stores the ordered list of repository URLs each owner has declared.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OwnerRepositoryUrls::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OwnerRepositoryUrls::OwnerId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OwnerRepositoryUrls::Position)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OwnerRepositoryUrls::Url).text().not_null())
                    .col(
                        ColumnDef::new(OwnerRepositoryUrls::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(OwnerRepositoryUrls::OwnerId)
                            .col(OwnerRepositoryUrls::Position),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_owner_repository_urls_owner_id")
                            .from(OwnerRepositoryUrls::Table, OwnerRepositoryUrls::OwnerId)
                            .to(Owners::Table, Owners::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OwnerRepositoryUrls::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum OwnerRepositoryUrls {
    Table,
    OwnerId,
    Position,
    Url,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Owners {
    Table,
    Id,
}
