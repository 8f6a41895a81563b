//! Outbound collaborators: user-facing messages, change notifications and
//! cache invalidation.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::domain::ChangeEvent;

/// Cache tag covering every rendered view of repository records.
pub const CACHE_TAG: &str = "repositories";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Status,
    Error,
}

/// Human-readable messages for whoever triggered the current operation.
pub trait Messenger: Send + Sync {
    fn add_status(&self, message: String);
    fn add_error(&self, message: String);
}

/// Writes messages to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMessenger;

impl Messenger for TracingMessenger {
    fn add_status(&self, message: String) {
        info!(target: "repo_sync::messages", "{}", message);
    }

    fn add_error(&self, message: String) {
        warn!(target: "repo_sync::messages", "{}", message);
    }
}

/// Collects messages in memory so a caller can return them.
#[derive(Debug, Default)]
pub struct BufferedMessenger {
    messages: Mutex<Vec<(MessageLevel, String)>>,
}

impl BufferedMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, level: MessageLevel, message: String) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((level, message));
        }
    }

    /// Messages at `level`, in arrival order.
    pub fn messages(&self, level: MessageLevel) -> Vec<String> {
        self.messages
            .lock()
            .map(|messages| {
                messages
                    .iter()
                    .filter(|(l, _)| *l == level)
                    .map(|(_, m)| m.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.messages(MessageLevel::Error)
    }

    pub fn statuses(&self) -> Vec<String> {
        self.messages(MessageLevel::Status)
    }
}

impl Messenger for BufferedMessenger {
    fn add_status(&self, message: String) {
        self.push(MessageLevel::Status, message);
    }

    fn add_error(&self, message: String) {
        self.push(MessageLevel::Error, message);
    }
}

/// Receives one event per applied repository mutation.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: &ChangeEvent);
}

/// Posts a status message describing each change.
pub struct MessengerSink {
    messenger: Arc<dyn Messenger>,
}

impl MessengerSink {
    pub fn new(messenger: Arc<dyn Messenger>) -> Self {
        Self { messenger }
    }
}

/// Status line announced for a change event.
pub fn describe_change(event: &ChangeEvent) -> String {
    format!(
        "The repository named {} has been {} ({}). The repository is owned by owner {}.",
        event.record.label, event.action, event.record.url, event.record.owner_id
    )
}

#[async_trait]
impl NotificationSink for MessengerSink {
    async fn notify(&self, event: &ChangeEvent) {
        self.messenger.add_status(describe_change(event));
    }
}

/// Invalidates cached views by tag.
pub trait CacheInvalidator: Send + Sync {
    fn invalidate_tags(&self, tags: &[&str]);
}

/// Cache layer stand-in that records the invalidation in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingCacheInvalidator;

impl CacheInvalidator for LoggingCacheInvalidator {
    fn invalidate_tags(&self, tags: &[&str]) {
        info!(?tags, "Invalidated cache tags");
    }
}
