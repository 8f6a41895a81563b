//! Service wiring shared by the HTTP server, the CLI and the queue worker.

use anyhow::{Context, Result};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::time::Duration;

use crate::batch::BatchDriver;
use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::notify::{
    CacheInvalidator, LoggingCacheInvalidator, Messenger, MessengerSink, NotificationSink,
    TracingMessenger,
};
use crate::providers::{ProviderRegistry, build_http_client};
use crate::queue::QueueWorker;
use crate::reconciler::Reconciler;
use crate::repositories::{
    CredentialRepository, OwnerDirectory, OwnerRepository, ReconcileJobRepository,
    RepositoryStore, SqlRepositoryStore,
};
use crate::scheduler::ReconcileScheduler;
use crate::secrets::{ChainedSecretStore, ConfigSecretStore, DatabaseSecretStore, SecretStore};
use crate::validator::UrlValidator;

#[derive(Clone)]
pub struct AppServices {
    pub registry: Arc<ProviderRegistry>,
    pub store: Arc<dyn RepositoryStore>,
    pub owners: Arc<OwnerRepository>,
    pub jobs: ReconcileJobRepository,
    pub credentials: Arc<DatabaseSecretStore>,
    pub validator: UrlValidator,
    pub driver: BatchDriver,
}

impl AppServices {
    /// Wires the production collaborators over `db`.
    ///
    /// Database-stored credentials take precedence over configured ones.
    pub fn build(config: &AppConfig, db: Arc<DatabaseConnection>) -> Result<Self> {
        let crypto_key = config
            .crypto_key
            .clone()
            .map(CryptoKey::new)
            .transpose()
            .context("invalid crypto key")?;

        let credentials = Arc::new(DatabaseSecretStore::new(
            CredentialRepository::new(db.clone()),
            crypto_key,
        ));
        let stored: Arc<dyn SecretStore> = credentials.clone();
        let configured: Arc<dyn SecretStore> = Arc::new(ConfigSecretStore::from_config(config));
        let secrets: Arc<dyn SecretStore> =
            Arc::new(ChainedSecretStore::new(vec![stored, configured]));

        let client = build_http_client(config).context("failed to build HTTP client")?;
        let registry = Arc::new(ProviderRegistry::from_config(config, client, secrets));

        let messenger: Arc<dyn Messenger> = Arc::new(TracingMessenger);
        let sink: Arc<dyn NotificationSink> = Arc::new(MessengerSink::new(messenger.clone()));
        let cache: Arc<dyn CacheInvalidator> = Arc::new(LoggingCacheInvalidator);

        Ok(Self::assemble(
            registry,
            db,
            credentials,
            messenger,
            sink,
            cache,
            config.batch_concurrency,
        ))
    }

    /// Wires services around an already-built registry and collaborators.
    pub fn assemble(
        registry: Arc<ProviderRegistry>,
        db: Arc<DatabaseConnection>,
        credentials: Arc<DatabaseSecretStore>,
        messenger: Arc<dyn Messenger>,
        sink: Arc<dyn NotificationSink>,
        cache: Arc<dyn CacheInvalidator>,
        batch_concurrency: usize,
    ) -> Self {
        let store: Arc<dyn RepositoryStore> = Arc::new(SqlRepositoryStore::new(db.clone()));
        let owners = Arc::new(OwnerRepository::new(db.clone()));
        let directory: Arc<dyn OwnerDirectory> = owners.clone();

        let validator = UrlValidator::new(registry.clone(), store.clone(), messenger.clone());
        let reconciler = Arc::new(Reconciler::new(
            registry.clone(),
            directory.clone(),
            store.clone(),
            messenger,
        ));
        let driver = BatchDriver::new(reconciler, directory, sink, cache, batch_concurrency);

        Self {
            registry,
            store,
            owners,
            jobs: ReconcileJobRepository::new(db),
            credentials,
            validator,
            driver,
        }
    }

    pub fn queue_worker(&self, config: &AppConfig) -> QueueWorker {
        QueueWorker::new(self.jobs.clone(), self.driver.clone(), config.queue.clone())
    }

    pub fn scheduler(&self, config: &AppConfig) -> ReconcileScheduler {
        ReconcileScheduler::new(
            self.owners.clone(),
            self.jobs.clone(),
            Duration::from_secs(config.schedule_interval_seconds),
            config.dry_run,
        )
    }
}
