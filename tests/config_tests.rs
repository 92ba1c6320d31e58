//! Layered configuration loading through the process environment.

use std::sync::{Mutex, OnceLock};

use tempfile::TempDir;

use aibox::config::{AiboxConfig, CONFIG_PATH_ENV};
use aibox::error::AiboxError;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const CONFIG_ENV_VARS: [&str; 6] = [
    CONFIG_PATH_ENV,
    "AIBOX_SESSION_TTL_SECS",
    "AIBOX_SWEEP_INTERVAL_SECS",
    "AIBOX_HISTORY_WINDOW",
    "AIBOX_MAX_ITERATIONS",
    "AIBOX_DEFAULT_MODEL",
];

struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    fn capture(keys: &[&str]) -> Self {
        let saved = keys
            .iter()
            .map(|key| ((*key).to_string(), std::env::var(key).ok()))
            .collect();
        for key in keys {
            std::env::remove_var(key);
        }
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

fn env_lock_guard() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("aibox.toml");
    std::fs::write(&path, body).expect("write config");
    path
}

#[test]
fn load_reads_the_file_named_by_the_env_var() {
    let _env_lock = env_lock_guard();
    let _env_guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    let dir = TempDir::new().expect("tempdir");
    let path = write_config(
        &dir,
        r#"
session_ttl_secs = 600
history_window = 12

[mcp_servers.search]
type = "http"
url = "http://localhost:7001/mcp"
"#,
    );
    std::env::set_var(CONFIG_PATH_ENV, &path);

    let config = AiboxConfig::load().expect("config loads");

    assert_eq!(config.session_ttl_secs, 600);
    assert_eq!(config.history_window, 12);
    assert_eq!(config.max_iterations, 20);
    assert!(config.mcp_servers.contains_key("search"));
}

#[test]
fn environment_wins_over_the_file() {
    let _env_lock = env_lock_guard();
    let _env_guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    let dir = TempDir::new().expect("tempdir");
    let path = write_config(
        &dir,
        r#"
session_ttl_secs = 600
default_model = "openai:gpt-4o"
"#,
    );
    std::env::set_var(CONFIG_PATH_ENV, &path);
    std::env::set_var("AIBOX_SESSION_TTL_SECS", "90");
    std::env::set_var("AIBOX_DEFAULT_MODEL", "anthropic:claude-sonnet");

    let config = AiboxConfig::load().expect("config loads");

    assert_eq!(config.session_ttl_secs, 90);
    assert_eq!(config.default_model.as_deref(), Some("anthropic:claude-sonnet"));
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let _env_lock = env_lock_guard();
    let _env_guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    let dir = TempDir::new().expect("tempdir");
    std::env::set_var(CONFIG_PATH_ENV, dir.path().join("absent.toml"));
    std::env::set_var("AIBOX_MAX_ITERATIONS", "5");

    let config = AiboxConfig::load().expect("config loads");

    assert_eq!(config.session_ttl_secs, 7200);
    assert_eq!(config.max_iterations, 5);
}

#[test]
fn zero_ttl_from_the_environment_is_rejected() {
    let _env_lock = env_lock_guard();
    let _env_guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    let dir = TempDir::new().expect("tempdir");
    std::env::set_var(CONFIG_PATH_ENV, dir.path().join("absent.toml"));
    std::env::set_var("AIBOX_SESSION_TTL_SECS", "0");

    let err = AiboxConfig::load().expect_err("zero ttl");
    assert!(matches!(err, AiboxError::Configuration(_)));
}

#[test]
fn malformed_file_is_a_toml_error() {
    let _env_lock = env_lock_guard();
    let _env_guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    let dir = TempDir::new().expect("tempdir");
    let path = write_config(&dir, "session_ttl_secs = \"soon\"");
    std::env::set_var(CONFIG_PATH_ENV, &path);

    let err = AiboxConfig::load().expect_err("bad value type");
    assert!(matches!(err, AiboxError::Toml(_)));
    assert_eq!(err.category(), aibox::error::ErrorCategory::Configuration);
}
