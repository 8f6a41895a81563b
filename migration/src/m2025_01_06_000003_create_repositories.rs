//! Migration to create the repositories table.
//!
//! One row per synchronized remote repository, owned by exactly one owner and
//! identified for reconciliation by `(owner_id, machine_name, source)`.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Repositories::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Repositories::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Repositories::OwnerId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Repositories::MachineName).text().not_null())
                    .col(ColumnDef::new(Repositories::Label).text().not_null())
                    .col(ColumnDef::new(Repositories::Description).text().null())
                    .col(
                        ColumnDef::new(Repositories::OpenIssueCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Repositories::Source).text().not_null())
                    .col(ColumnDef::new(Repositories::Url).text().not_null())
                    .col(ColumnDef::new(Repositories::ContentHash).text().not_null())
                    .col(
                        ColumnDef::new(Repositories::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Repositories::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_repositories_owner_machine_name_source")
                    .table(Repositories::Table)
                    .col(Repositories::OwnerId)
                    .col(Repositories::MachineName)
                    .col(Repositories::Source)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Uniqueness checks look records up by canonical url
        manager
            .create_index(
                Index::create()
                    .name("idx_repositories_url")
                    .table(Repositories::Table)
                    .col(Repositories::Url)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_repositories_url")
                    .table(Repositories::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_repositories_owner_machine_name_source")
                    .table(Repositories::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Repositories::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Repositories {
    Table,
    Id,
    OwnerId,
    MachineName,
    Label,
    Description,
    OpenIssueCount,
    Source,
    Url,
    ContentHash,
    CreatedAt,
    UpdatedAt,
}
