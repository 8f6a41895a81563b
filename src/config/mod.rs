//! Configuration loading for the repository sync service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `REPO_SYNC_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix stripped from every recognised environment variable.
pub const ENV_PREFIX: &str = "REPO_SYNC_";

/// Provider identifiers enabled when `ENABLED_PROVIDERS` is not set, in merge order.
pub const DEFAULT_ENABLED_PROVIDERS: &[&str] = &["github", "gitlab", "yml_remote"];

/// Application configuration derived from `REPO_SYNC_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operator_tokens: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crypto_key: Option<Vec<u8>>,
    /// Ordered provider identifiers. Later providers win on key collisions.
    #[serde(default = "default_enabled_providers")]
    pub enabled_providers: Vec<String>,
    /// Default for CLI and HTTP invocations that do not say otherwise.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default = "default_github_api_base")]
    pub github_api_base: String,
    #[serde(default = "default_gitlab_api_base")]
    pub gitlab_api_base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gitlab_token: Option<String>,
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
    #[serde(default = "default_schedule_interval_seconds")]
    pub schedule_interval_seconds: u64,
    #[serde(default)]
    pub queue: QueueConfig,
}

/// Reconcile queue worker parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct QueueConfig {
    /// Milliseconds between worker ticks
    #[serde(default = "default_queue_tick_ms")]
    pub tick_ms: u64,
    /// Jobs executed concurrently per tick
    #[serde(default = "default_queue_concurrency")]
    pub concurrency: usize,
    /// Jobs claimed per tick
    #[serde(default = "default_queue_claim_batch")]
    pub claim_batch: usize,
    /// Attempts before a job is marked failed
    #[serde(default = "default_queue_max_attempts")]
    pub max_attempts: i32,
    #[serde(default = "default_queue_backoff_base_seconds")]
    pub backoff_base_seconds: u64,
    #[serde(default = "default_queue_backoff_max_seconds")]
    pub backoff_max_seconds: u64,
    #[serde(default = "default_queue_jitter_factor")]
    pub jitter_factor: f64,
    /// Running jobs older than this are considered abandoned and requeued
    #[serde(default = "default_queue_max_run_seconds")]
    pub max_run_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_queue_tick_ms(),
            concurrency: default_queue_concurrency(),
            claim_batch: default_queue_claim_batch(),
            max_attempts: default_queue_max_attempts(),
            backoff_base_seconds: default_queue_backoff_base_seconds(),
            backoff_max_seconds: default_queue_backoff_max_seconds(),
            jitter_factor: default_queue_jitter_factor(),
            max_run_seconds: default_queue_max_run_seconds(),
        }
    }
}

impl QueueConfig {
    /// Validate queue bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 || self.claim_batch == 0 {
            return Err(ConfigError::InvalidQueueConcurrency {
                concurrency: self.concurrency,
                claim_batch: self.claim_batch,
            });
        }

        if self.max_attempts < 1 {
            return Err(ConfigError::InvalidQueueMaxAttempts {
                value: self.max_attempts,
            });
        }

        if self.backoff_base_seconds > self.backoff_max_seconds {
            return Err(ConfigError::InvalidQueueBackoff {
                base: self.backoff_base_seconds,
                max: self.backoff_max_seconds,
            });
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::InvalidQueueJitter {
                value: self.jitter_factor,
            });
        }

        if self.max_run_seconds < 30 {
            return Err(ConfigError::InvalidQueueMaxRun {
                value: self.max_run_seconds,
            });
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            operator_tokens: Vec::new(),
            crypto_key: None,
            enabled_providers: default_enabled_providers(),
            dry_run: false,
            fetch_timeout_ms: default_fetch_timeout_ms(),
            github_api_base: default_github_api_base(),
            gitlab_api_base: default_gitlab_api_base(),
            github_username: None,
            github_token: None,
            gitlab_token: None,
            batch_concurrency: default_batch_concurrency(),
            schedule_interval_seconds: default_schedule_interval_seconds(),
            queue: QueueConfig::default(),
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if !config.operator_tokens.is_empty() {
            config.operator_tokens = vec!["[REDACTED]".to_string()];
        }
        if config.crypto_key.is_some() {
            config.crypto_key = Some(b"[REDACTED]".to_vec());
        }
        if config.github_token.is_some() {
            config.github_token = Some("[REDACTED]".to_string());
        }
        if config.gitlab_token.is_some() {
            config.gitlab_token = Some("[REDACTED]".to_string());
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration bounds.
    ///
    /// Operator tokens are only required to serve HTTP, which checks them
    /// separately through [`AppConfig::require_operator_tokens`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref key) = self.crypto_key
            && key.len() != 32
        {
            return Err(ConfigError::InvalidCryptoKeyLength { length: key.len() });
        }

        let mut seen = Vec::with_capacity(self.enabled_providers.len());
        for id in &self.enabled_providers {
            if id.trim().is_empty() {
                return Err(ConfigError::EmptyProviderId);
            }
            if seen.contains(&id) {
                return Err(ConfigError::DuplicateProvider { id: id.clone() });
            }
            seen.push(id);
        }

        if self.fetch_timeout_ms < 100 || self.fetch_timeout_ms > 120_000 {
            return Err(ConfigError::InvalidFetchTimeout {
                value: self.fetch_timeout_ms,
            });
        }

        for (name, value) in [
            ("GITHUB_API_BASE", &self.github_api_base),
            ("GITLAB_API_BASE", &self.gitlab_api_base),
        ] {
            if url::Url::parse(value).is_err() {
                return Err(ConfigError::InvalidApiBase {
                    name,
                    value: value.clone(),
                });
            }
        }

        if self.batch_concurrency == 0 || self.batch_concurrency > 64 {
            return Err(ConfigError::InvalidBatchConcurrency {
                value: self.batch_concurrency,
            });
        }

        if self.schedule_interval_seconds < 60 {
            return Err(ConfigError::InvalidScheduleInterval {
                value: self.schedule_interval_seconds,
            });
        }

        self.queue.validate()
    }

    /// Fails unless at least one operator token is configured.
    pub fn require_operator_tokens(&self) -> Result<(), ConfigError> {
        if self.operator_tokens.is_empty() {
            return Err(ConfigError::MissingOperatorTokens);
        }
        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "sqlite://repo_sync.db?mode=rwc".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_enabled_providers() -> Vec<String> {
    DEFAULT_ENABLED_PROVIDERS
        .iter()
        .map(|id| id.to_string())
        .collect()
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_github_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_gitlab_api_base() -> String {
    "https://gitlab.com".to_string()
}

fn default_batch_concurrency() -> usize {
    4
}

fn default_schedule_interval_seconds() -> u64 {
    3600
}

fn default_queue_tick_ms() -> u64 {
    5000
}

fn default_queue_concurrency() -> usize {
    4
}

fn default_queue_claim_batch() -> usize {
    16
}

fn default_queue_max_attempts() -> i32 {
    5
}

fn default_queue_backoff_base_seconds() -> u64 {
    30
}

fn default_queue_backoff_max_seconds() -> u64 {
    1800
}

fn default_queue_jitter_factor() -> f64 {
    0.1
}

fn default_queue_max_run_seconds() -> u64 {
    300
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error(
        "no operator tokens configured; set REPO_SYNC_OPERATOR_TOKEN or REPO_SYNC_OPERATOR_TOKENS"
    )]
    MissingOperatorTokens,
    #[error("crypto key is invalid base64: {error}")]
    InvalidCryptoKeyBase64 { error: String },
    #[error("crypto key must decode to exactly 32 bytes, got {length} bytes")]
    InvalidCryptoKeyLength { length: usize },
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
    #[error("enabled provider list contains an empty identifier")]
    EmptyProviderId,
    #[error("provider '{id}' is enabled more than once")]
    DuplicateProvider { id: String },
    #[error("fetch timeout must be between 100 and 120000 milliseconds, got {value}")]
    InvalidFetchTimeout { value: u64 },
    #[error("{name} is not a valid url: '{value}'")]
    InvalidApiBase { name: &'static str, value: String },
    #[error("batch concurrency must be between 1 and 64, got {value}")]
    InvalidBatchConcurrency { value: usize },
    #[error("schedule interval must be at least 60 seconds, got {value}")]
    InvalidScheduleInterval { value: u64 },
    #[error("queue concurrency ({concurrency}) and claim batch ({claim_batch}) must be positive")]
    InvalidQueueConcurrency {
        concurrency: usize,
        claim_batch: usize,
    },
    #[error("queue max attempts must be at least 1, got {value}")]
    InvalidQueueMaxAttempts { value: i32 },
    #[error("queue backoff base seconds ({base}) cannot be greater than max seconds ({max})")]
    InvalidQueueBackoff { base: u64, max: u64 },
    #[error("queue jitter factor must be between 0.0 and 1.0, got {value}")]
    InvalidQueueJitter { value: f64 },
    #[error("queue max run seconds must be at least 30, got {value}")]
    InvalidQueueMaxRun { value: u64 },
}

/// Loads configuration using layered `.env` files and `REPO_SYNC_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads `.env`, `.env.local`, `.env.{profile}`, `.env.{profile}.local`
    /// and finally the process environment, later layers winning.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = take_string(&mut layered, "PROFILE").unwrap_or(profile_hint);
        let api_bind_addr =
            take_string(&mut layered, "API_BIND_ADDR").unwrap_or_else(default_api_bind_addr);
        let log_level = take_string(&mut layered, "LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format =
            take_string(&mut layered, "LOG_FORMAT").unwrap_or_else(default_log_format);
        let database_url =
            take_string(&mut layered, "DATABASE_URL").unwrap_or_else(default_database_url);

        // Comma-separated list wins over the single-token form
        let operator_tokens = if let Some(tokens) = layered.remove("OPERATOR_TOKENS") {
            split_list(&tokens)
        } else if let Some(token) = take_string(&mut layered, "OPERATOR_TOKEN") {
            vec![token]
        } else {
            Vec::new()
        };

        let crypto_key = match take_string(&mut layered, "CRYPTO_KEY") {
            Some(key_str) => {
                use base64::{Engine as _, engine::general_purpose};
                Some(general_purpose::STANDARD.decode(key_str.trim()).map_err(|e| {
                    ConfigError::InvalidCryptoKeyBase64 {
                        error: e.to_string(),
                    }
                })?)
            }
            None => None,
        };

        // An explicitly empty list disables every provider
        let enabled_providers = match layered.remove("ENABLED_PROVIDERS") {
            Some(list) => split_list(&list),
            None => default_enabled_providers(),
        };

        let queue = QueueConfig {
            tick_ms: take_parsed(&mut layered, "QUEUE_TICK_MS")?
                .unwrap_or_else(default_queue_tick_ms),
            concurrency: take_parsed(&mut layered, "QUEUE_CONCURRENCY")?
                .unwrap_or_else(default_queue_concurrency),
            claim_batch: take_parsed(&mut layered, "QUEUE_CLAIM_BATCH")?
                .unwrap_or_else(default_queue_claim_batch),
            max_attempts: take_parsed(&mut layered, "QUEUE_MAX_ATTEMPTS")?
                .unwrap_or_else(default_queue_max_attempts),
            backoff_base_seconds: take_parsed(&mut layered, "QUEUE_BACKOFF_BASE_SECONDS")?
                .unwrap_or_else(default_queue_backoff_base_seconds),
            backoff_max_seconds: take_parsed(&mut layered, "QUEUE_BACKOFF_MAX_SECONDS")?
                .unwrap_or_else(default_queue_backoff_max_seconds),
            jitter_factor: take_parsed(&mut layered, "QUEUE_JITTER_FACTOR")?
                .unwrap_or_else(default_queue_jitter_factor),
            max_run_seconds: take_parsed(&mut layered, "QUEUE_MAX_RUN_SECONDS")?
                .unwrap_or_else(default_queue_max_run_seconds),
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            db_max_connections: take_parsed(&mut layered, "DB_MAX_CONNECTIONS")?
                .unwrap_or_else(default_db_max_connections),
            db_acquire_timeout_ms: take_parsed(&mut layered, "DB_ACQUIRE_TIMEOUT_MS")?
                .unwrap_or_else(default_db_acquire_timeout_ms),
            operator_tokens,
            crypto_key,
            enabled_providers,
            dry_run: take_parsed(&mut layered, "DRY_RUN")?.unwrap_or(false),
            fetch_timeout_ms: take_parsed(&mut layered, "FETCH_TIMEOUT_MS")?
                .unwrap_or_else(default_fetch_timeout_ms),
            github_api_base: take_string(&mut layered, "GITHUB_API_BASE")
                .unwrap_or_else(default_github_api_base),
            gitlab_api_base: take_string(&mut layered, "GITLAB_API_BASE")
                .unwrap_or_else(default_gitlab_api_base),
            github_username: take_string(&mut layered, "GITHUB_USERNAME"),
            github_token: take_string(&mut layered, "GITHUB_TOKEN"),
            gitlab_token: take_string(&mut layered, "GITLAB_TOKEN"),
            batch_concurrency: take_parsed(&mut layered, "BATCH_CONCURRENCY")?
                .unwrap_or_else(default_batch_concurrency),
            schedule_interval_seconds: take_parsed(&mut layered, "SCHEDULE_INTERVAL_SECONDS")?
                .unwrap_or_else(default_schedule_interval_seconds),
            queue,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn take_string(values: &mut BTreeMap<String, String>, key: &str) -> Option<String> {
    values
        .remove(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn take_parsed<T: FromStr>(
    values: &mut BTreeMap<String, String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match take_string(values, key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: format!("{ENV_PREFIX}{key}"),
                value: raw,
            }),
        None => Ok(None),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.enabled_providers,
            vec!["github", "gitlab", "yml_remote"]
        );
    }

    #[test]
    fn duplicate_provider_is_rejected() {
        let config = AppConfig {
            enabled_providers: vec!["github".into(), "github".into()],
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateProvider { id }) if id == "github"
        ));
    }

    #[test]
    fn queue_backoff_bounds_are_checked() {
        let mut config = AppConfig::default();
        config.queue.backoff_base_seconds = 100;
        config.queue.backoff_max_seconds = 10;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidQueueBackoff { base: 100, max: 10 })
        ));
    }

    #[test]
    fn short_crypto_key_is_rejected() {
        let config = AppConfig {
            crypto_key: Some(vec![0u8; 16]),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCryptoKeyLength { length: 16 })
        ));
    }

    #[test]
    fn redacted_json_hides_secrets() {
        let config = AppConfig {
            operator_tokens: vec!["operator-secret".into()],
            github_token: Some("ghp_secret".into()),
            gitlab_token: Some("glpat_secret".into()),
            ..AppConfig::default()
        };
        let json = config.redacted_json().expect("serializes");
        assert!(!json.contains("operator-secret"));
        assert!(!json.contains("ghp_secret"));
        assert!(!json.contains("glpat_secret"));
        assert!(json.contains("[REDACTED]"));
    }

    #[test]
    fn split_list_drops_blanks() {
        assert_eq!(split_list(" github, ,yml_remote "), vec!["github", "yml_remote"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn missing_operator_tokens_are_reported() {
        let config = AppConfig::default();
        assert!(matches!(
            config.require_operator_tokens(),
            Err(ConfigError::MissingOperatorTokens)
        ));
    }
}
