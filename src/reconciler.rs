//! # Reconciler
//!
//! Brings one owner's persisted repository records in line with the metadata
//! their declared URLs currently report.
//!
//! A pass has three steps:
//! 1. Collect fresh metadata from every enabled provider, keyed by repository
//!    key. Providers run in configured order and a later provider replaces an
//!    earlier one on a key collision.
//! 2. Upsert: create records for unknown `(owner, key, source)` triples and
//!    rewrite records whose content hash changed.
//! 3. Delete: remove records whose key is no longer fresh, or is now produced
//!    by a different source.
//!
//! Storage failures are recorded per record and never stop the pass. A dry
//! run plans the same changes without writing anything.

use metrics::{counter, histogram};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use crate::domain::{ChangeAction, ChangeEvent, RepositoryMetadata, RepositoryRecord};
use crate::notify::Messenger;
use crate::providers::{ProviderRegistry, RegistryError, get_repo};
use crate::repositories::{OwnerDirectory, RepositoryStore, StoreError};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("owner directory unavailable: {0}")]
    Directory(#[source] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilePhase {
    Upsert,
    Delete,
}

/// A mutation the pass decided on, whether or not it was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PlannedChange {
    pub action: ChangeAction,
    pub key: String,
    pub source: String,
}

/// A storage failure that skipped one record (or a whole phase when `key`
/// is absent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RecordFailure {
    pub phase: ReconcilePhase,
    pub key: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ReconcileReport {
    pub owner_id: i64,
    pub dry_run: bool,
    pub planned: Vec<PlannedChange>,
    /// One event per applied mutation; always empty on a dry run
    pub events: Vec<ChangeEvent>,
    pub failures: Vec<RecordFailure>,
}

impl ReconcileReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Number of applied mutations with `action`.
    pub fn applied(&self, action: ChangeAction) -> usize {
        self.events.iter().filter(|e| e.action == action).count()
    }

    fn plan(&mut self, action: ChangeAction, metadata_key: &str, source: &str) {
        self.planned.push(PlannedChange {
            action,
            key: metadata_key.to_string(),
            source: source.to_string(),
        });
    }

    fn applied_change(&mut self, action: ChangeAction, record: RepositoryRecord) {
        counter!("repository_changes_total", "action" => action.as_str()).increment(1);
        self.events.push(ChangeEvent { action, record });
    }

    fn fail(&mut self, phase: ReconcilePhase, key: Option<&str>, err: StoreError) {
        warn!(
            owner_id = self.owner_id,
            ?phase,
            key,
            error = %err,
            "Repository record mutation failed"
        );
        counter!("reconcile_record_failures_total").increment(1);
        self.failures.push(RecordFailure {
            phase,
            key: key.map(str::to_string),
            error: err.to_string(),
        });
    }
}

#[derive(Clone)]
pub struct Reconciler {
    registry: Arc<ProviderRegistry>,
    owners: Arc<dyn OwnerDirectory>,
    store: Arc<dyn RepositoryStore>,
    messenger: Arc<dyn Messenger>,
}

impl Reconciler {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        owners: Arc<dyn OwnerDirectory>,
        store: Arc<dyn RepositoryStore>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            registry,
            owners,
            store,
            messenger,
        }
    }

    /// Same reconciler reporting fetch failures to `messenger`.
    pub fn with_messenger(&self, messenger: Arc<dyn Messenger>) -> Self {
        Self {
            messenger,
            ..self.clone()
        }
    }

    /// Fresh metadata for every declared URL some enabled provider accepts.
    pub async fn collect_fresh(
        &self,
        owner_id: i64,
    ) -> Result<BTreeMap<String, RepositoryMetadata>, ReconcileError> {
        let providers = self.registry.enabled()?;
        let urls = self
            .owners
            .declared_urls(owner_id)
            .await
            .map_err(ReconcileError::Directory)?;

        let mut fresh = BTreeMap::new();
        for provider in &providers {
            for url in urls.iter().filter(|url| provider.validate(url)) {
                let Some(metadata) = get_repo(provider.as_ref(), url, self.messenger.as_ref()).await
                else {
                    continue;
                };
                if let Some(replaced) = fresh.insert(metadata.key.clone(), metadata) {
                    warn!(
                        owner_id,
                        key = %replaced.key,
                        replaced_source = %replaced.source,
                        source = provider.id(),
                        "Repository key reported twice; keeping the later provider"
                    );
                }
            }
        }
        Ok(fresh)
    }

    #[instrument(skip(self))]
    pub async fn reconcile(
        &self,
        owner_id: i64,
        dry_run: bool,
    ) -> Result<ReconcileReport, ReconcileError> {
        let started = Instant::now();
        let fresh = self.collect_fresh(owner_id).await?;
        debug!(fresh = fresh.len(), "Collected fresh repository metadata");

        let mut report = ReconcileReport {
            owner_id,
            dry_run,
            ..ReconcileReport::default()
        };

        self.upsert_phase(owner_id, &fresh, &mut report).await;
        self.delete_phase(owner_id, &fresh, &mut report).await;

        histogram!("reconcile_duration_seconds").record(started.elapsed().as_secs_f64());
        info!(
            planned = report.planned.len(),
            applied = report.events.len(),
            failures = report.failures.len(),
            "Reconciled owner repositories"
        );
        Ok(report)
    }

    async fn upsert_phase(
        &self,
        owner_id: i64,
        fresh: &BTreeMap<String, RepositoryMetadata>,
        report: &mut ReconcileReport,
    ) {
        for (key, metadata) in fresh {
            let hash = metadata.content_hash();

            let existing = match self
                .store
                .find_by_owner_and_key(owner_id, key, &metadata.source)
                .await
            {
                Ok(existing) => existing,
                Err(err) => {
                    report.fail(ReconcilePhase::Upsert, Some(key), err);
                    continue;
                }
            };

            match existing {
                None => {
                    report.plan(ChangeAction::Created, key, &metadata.source);
                    if report.dry_run {
                        continue;
                    }
                    match self.store.create(owner_id, metadata, &hash).await {
                        Ok(record) => report.applied_change(ChangeAction::Created, record),
                        Err(err) => report.fail(ReconcilePhase::Upsert, Some(key), err),
                    }
                }
                Some(record) if record.content_hash != hash => {
                    report.plan(ChangeAction::Updated, key, &metadata.source);
                    if report.dry_run {
                        continue;
                    }
                    match self.store.update(record.id, metadata, &hash).await {
                        Ok(record) => report.applied_change(ChangeAction::Updated, record),
                        Err(err) => report.fail(ReconcilePhase::Upsert, Some(key), err),
                    }
                }
                Some(_) => {}
            }
        }
    }

    async fn delete_phase(
        &self,
        owner_id: i64,
        fresh: &BTreeMap<String, RepositoryMetadata>,
        report: &mut ReconcileReport,
    ) {
        let records = match self.store.find_all_by_owner(owner_id).await {
            Ok(records) => records,
            Err(err) => {
                report.fail(ReconcilePhase::Delete, None, err);
                return;
            }
        };

        let stale = records.into_iter().filter(|record| {
            fresh
                .get(&record.key)
                .is_none_or(|metadata| metadata.source != record.source)
        });

        for record in stale {
            report.plan(ChangeAction::Deleted, &record.key, &record.source);
            if report.dry_run {
                continue;
            }
            let key = record.key.clone();
            match self.store.delete(record.id).await {
                Ok(()) => report.applied_change(ChangeAction::Deleted, record),
                Err(err) => report.fail(ReconcilePhase::Delete, Some(&key), err),
            }
        }
    }
}
