//! Test utilities shared by the integration tests.
//!
//! In-memory SQLite with migrations applied, scripted providers standing in
//! for GitHub/GitLab/manifest fetches, and recorders for change events and
//! cache invalidations.

use anyhow::Result;
use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use repo_sync::app::AppServices;
use repo_sync::config::AppConfig;
use repo_sync::domain::{ChangeAction, ChangeEvent, RepositoryMetadata};
use repo_sync::notify::{BufferedMessenger, CacheInvalidator, NotificationSink};
use repo_sync::providers::{FetchError, ProviderRegistry, RepositoryProvider};
use repo_sync::repositories::CredentialRepository;
use repo_sync::secrets::DatabaseSecretStore;
use repo_sync::server::AppState;

/// Sets up an in-memory SQLite database with all migrations applied.
#[allow(dead_code)]
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;

    // Records may reference owners that were never created through the API
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys = OFF".to_string(),
    ))
    .await?;

    Ok(db)
}

#[allow(dead_code)]
pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    Ok(Arc::new(setup_test_db().await?))
}

/// Provider answering from a scripted table of URL -> metadata.
///
/// URLs missing from the table fail with [`FetchError::NotFound`].
#[allow(dead_code)]
pub struct StubProvider {
    id: &'static str,
    label: &'static str,
    prefix: &'static str,
    repos: Mutex<HashMap<String, RepositoryMetadata>>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl StubProvider {
    pub fn new(id: &'static str, label: &'static str, prefix: &'static str) -> Arc<Self> {
        Arc::new(Self {
            id,
            label,
            prefix,
            repos: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn github() -> Arc<Self> {
        Self::new("github", "GitHub", "https://github.com/")
    }

    pub fn gitlab() -> Arc<Self> {
        Self::new("gitlab", "GitLab", "https://gitlab.com/")
    }

    /// Scripts `url` to report `key` with `open_issue_count` open issues.
    pub fn set(&self, url: &str, key: &str, open_issue_count: u64) {
        let label = key.rsplit('/').next().unwrap_or(key).to_string();
        self.set_metadata(
            url,
            RepositoryMetadata {
                key: key.to_string(),
                label,
                description: Some(format!("{key} description")),
                open_issue_count,
                source: self.id.to_string(),
                url: url.to_string(),
            },
        );
    }

    pub fn set_metadata(&self, url: &str, metadata: RepositoryMetadata) {
        self.repos
            .lock()
            .unwrap()
            .insert(url.to_string(), metadata);
    }

    pub fn remove(&self, url: &str) {
        self.repos.lock().unwrap().remove(url);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositoryProvider for StubProvider {
    fn id(&self) -> &'static str {
        self.id
    }

    fn label(&self) -> &'static str {
        self.label
    }

    fn validate(&self, url: &str) -> bool {
        url.starts_with(self.prefix)
    }

    fn validate_help_text(&self) -> &'static str {
        self.prefix
    }

    async fn fetch(&self, url: &str) -> Result<RepositoryMetadata, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.repos
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(FetchError::NotFound)
    }
}

/// Sink remembering every dispatched change event.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ChangeEvent>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<(ChangeAction, String)> {
        self.events()
            .into_iter()
            .map(|event| (event.action, event.record.key))
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, event: &ChangeEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Cache invalidator counting invalidations.
#[derive(Default)]
pub struct RecordingCache {
    invalidations: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl RecordingCache {
    pub fn invalidations(&self) -> Vec<String> {
        self.invalidations.lock().unwrap().clone()
    }
}

impl CacheInvalidator for RecordingCache {
    fn invalidate_tags(&self, tags: &[&str]) {
        self.invalidations
            .lock()
            .unwrap()
            .extend(tags.iter().map(|tag| tag.to_string()));
    }
}

/// Fully wired services over an in-memory database and stub providers.
#[allow(dead_code)]
pub struct Harness {
    pub db: Arc<DatabaseConnection>,
    pub services: AppServices,
    pub github: Arc<StubProvider>,
    pub gitlab: Arc<StubProvider>,
    pub messenger: Arc<BufferedMessenger>,
    pub sink: Arc<RecordingSink>,
    pub cache: Arc<RecordingCache>,
}

#[allow(dead_code)]
impl Harness {
    /// Harness with both stub providers registered and `enabled` switched on,
    /// in that order.
    pub async fn new(enabled: &[&str]) -> Result<Self> {
        let db = setup_test_db_arc().await?;
        let github = StubProvider::github();
        let gitlab = StubProvider::gitlab();

        let mut registry =
            ProviderRegistry::new(enabled.iter().map(|id| id.to_string()).collect());
        registry.register(github.clone());
        registry.register(gitlab.clone());

        let messenger = Arc::new(BufferedMessenger::new());
        let sink = Arc::new(RecordingSink::default());
        let cache = Arc::new(RecordingCache::default());
        let credentials = Arc::new(DatabaseSecretStore::new(
            CredentialRepository::new(db.clone()),
            None,
        ));

        let services = AppServices::assemble(
            Arc::new(registry),
            db.clone(),
            credentials,
            messenger.clone(),
            sink.clone(),
            cache.clone(),
            2,
        );

        Ok(Self {
            db,
            services,
            github,
            gitlab,
            messenger,
            sink,
            cache,
        })
    }

    /// Harness with only GitHub enabled.
    pub async fn github_only() -> Result<Self> {
        Self::new(&["github"]).await
    }

    /// Router state using `config` for auth and dry-run defaults.
    pub fn app_state(&self, config: AppConfig) -> AppState {
        AppState {
            config: Arc::new(config),
            db: self.db.clone(),
            services: self.services.clone(),
        }
    }
}

#[allow(dead_code)]
pub const OPERATOR_TOKEN: &str = "test-operator-token";

/// Configuration accepted by the auth middleware with [`OPERATOR_TOKEN`].
#[allow(dead_code)]
pub fn test_config() -> AppConfig {
    AppConfig {
        operator_tokens: vec![OPERATOR_TOKEN.to_string()],
        ..AppConfig::default()
    }
}
