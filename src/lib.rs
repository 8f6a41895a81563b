//! # Repository Sync Library
//!
//! Keeps each owner's repository records in line with the repository URLs
//! they declare. Providers (GitHub, GitLab, remote YAML manifests) fetch
//! metadata; the reconciler diffs it against stored records; the batch
//! driver, queue worker and scheduler run reconciliation for many owners.

pub mod app;
pub mod auth;
pub mod batch;
pub mod config;
pub mod crypto;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod models;
pub mod notify;
pub mod providers;
pub mod queue;
pub mod reconciler;
pub mod repositories;
pub mod scheduler;
pub mod secrets;
pub mod server;
pub mod telemetry;
pub mod validator;
pub use migration;
