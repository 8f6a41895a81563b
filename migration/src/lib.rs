//! Database migrations for the repository sync service.

pub use sea_orm_migration::prelude::*;

mod m2025_01_06_000001_create_owners;
mod m2025_01_06_000002_create_owner_repository_urls;
mod m2025_01_06_000003_create_repositories;
mod m2025_01_06_000004_create_provider_credentials;
mod m2025_01_08_000001_create_reconcile_jobs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_01_06_000001_create_owners::Migration),
            Box::new(m2025_01_06_000002_create_owner_repository_urls::Migration),
            Box::new(m2025_01_06_000003_create_repositories::Migration),
            Box::new(m2025_01_06_000004_create_provider_credentials::Migration),
            Box::new(m2025_01_08_000001_create_reconcile_jobs::Migration),
        ]
    }
}
