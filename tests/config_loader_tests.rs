use repo_sync::config::{ConfigError, ConfigLoader};
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

const VARS: &[&str] = &[
    "REPO_SYNC_PROFILE",
    "REPO_SYNC_API_BIND_ADDR",
    "REPO_SYNC_LOG_LEVEL",
    "REPO_SYNC_CRYPTO_KEY",
    "REPO_SYNC_ENABLED_PROVIDERS",
    "REPO_SYNC_DRY_RUN",
    "REPO_SYNC_GITHUB_TOKEN",
    "REPO_SYNC_QUEUE_MAX_ATTEMPTS",
    "REPO_SYNC_OPERATOR_TOKENS",
];

fn clear_env() {
    for var in VARS {
        unsafe {
            env::remove_var(var);
        }
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

fn empty_dir_loader() -> (TempDir, ConfigLoader) {
    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    (temp_dir, loader)
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();

    let (_dir, loader) = empty_dir_loader();
    let cfg = loader.load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.enabled_providers, vec!["github", "gitlab", "yml_remote"]);
    assert!(!cfg.dry_run);
    assert!(cfg.operator_tokens.is_empty());
    cfg.bind_addr().expect("default bind addr parses");
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "REPO_SYNC_API_BIND_ADDR=127.0.0.1:3000\n");
    write_env_file(
        &temp_dir,
        ".env.test",
        "REPO_SYNC_API_BIND_ADDR=192.168.0.10:5000\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "REPO_SYNC_API_BIND_ADDR=10.0.0.5:6000\n",
    );

    // Select profile via .env.local before profile-specific files load.
    write_env_file(
        &temp_dir,
        ".env.local",
        "REPO_SYNC_PROFILE=test\nREPO_SYNC_API_BIND_ADDR=127.0.0.1:4000\nREPO_SYNC_OPERATOR_TOKEN=test-token-for-layered-test\n",
    );

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with layered env files");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    assert_eq!(cfg.operator_tokens, vec!["test-token-for-layered-test"]);
    clear_env();
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "REPO_SYNC_API_BIND_ADDR=127.0.0.1:3000\nREPO_SYNC_DRY_RUN=false\n",
    );

    unsafe {
        env::set_var("REPO_SYNC_API_BIND_ADDR", "0.0.0.0:9090");
        env::set_var("REPO_SYNC_DRY_RUN", "true");
    }

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with env override");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:9090");
    assert!(cfg.dry_run);

    clear_env();
}

#[test]
fn invalid_bind_addr_returns_error() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("REPO_SYNC_API_BIND_ADDR", "not-an-addr");
    }
    let (_dir, loader) = empty_dir_loader();
    let err = loader.load().expect_err("invalid bind addr should fail");
    assert!(format!("{}", err).contains("invalid api bind address"));

    clear_env();
}

#[test]
fn enabled_providers_keep_configured_order() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("REPO_SYNC_ENABLED_PROVIDERS", "yml_remote, github");
    }
    let (_dir, loader) = empty_dir_loader();
    let cfg = loader.load().expect("config loads");
    assert_eq!(cfg.enabled_providers, vec!["yml_remote", "github"]);

    clear_env();
}

#[test]
fn explicitly_empty_provider_list_disables_everything() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("REPO_SYNC_ENABLED_PROVIDERS", "");
    }
    let (_dir, loader) = empty_dir_loader();
    let cfg = loader.load().expect("config loads");
    assert!(cfg.enabled_providers.is_empty());

    clear_env();
}

#[test]
fn duplicate_provider_is_rejected() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("REPO_SYNC_ENABLED_PROVIDERS", "github,gitlab,github");
    }
    let (_dir, loader) = empty_dir_loader();
    let err = loader.load().expect_err("duplicate provider should fail");
    assert!(matches!(err, ConfigError::DuplicateProvider { ref id } if id == "github"));

    clear_env();
}

#[test]
fn unparsable_number_names_the_variable() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("REPO_SYNC_QUEUE_MAX_ATTEMPTS", "lots");
    }
    let (_dir, loader) = empty_dir_loader();
    let err = loader.load().expect_err("bad number should fail");
    assert_eq!(
        err.to_string(),
        "invalid value 'lots' for REPO_SYNC_QUEUE_MAX_ATTEMPTS"
    );

    clear_env();
}

#[test]
fn crypto_key_must_be_32_bytes() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        // "short" in base64
        env::set_var("REPO_SYNC_CRYPTO_KEY", "c2hvcnQ=");
    }
    let (_dir, loader) = empty_dir_loader();
    let err = loader.load().expect_err("short key should fail");
    assert!(matches!(err, ConfigError::InvalidCryptoKeyLength { length: 5 }));

    clear_env();
}

#[test]
fn redacted_json_hides_secrets() {
    let _guard = env_guard();
    clear_env();

    unsafe {
        env::set_var("REPO_SYNC_GITHUB_TOKEN", "ghp_supersecret");
        env::set_var("REPO_SYNC_OPERATOR_TOKENS", "op-one,op-two");
    }
    let (_dir, loader) = empty_dir_loader();
    let cfg = loader.load().expect("config loads");
    assert_eq!(cfg.operator_tokens, vec!["op-one", "op-two"]);

    let redacted = cfg.redacted_json().expect("serializes");
    assert!(!redacted.contains("ghp_supersecret"));
    assert!(!redacted.contains("op-one"));

    clear_env();
}
