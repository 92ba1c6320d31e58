//! Configuration system (layered: code > env > config file > defaults).

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AiboxError, Result};
use crate::tools::ToolConfig;

/// Environment variable that points at an explicit config file.
pub const CONFIG_PATH_ENV: &str = "AIBOX_CONFIG";

/// Layered configuration for the agent core.
///
/// Resolution order, lowest to highest precedence:
/// 1. Built-in defaults
/// 2. TOML config file (`$AIBOX_CONFIG` or the platform config dir)
/// 3. Environment variables (a `.env` file is loaded first when present)
/// 4. Explicit `with_*` setters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiboxConfig {
    /// Idle time after which a cached session agent is evicted.
    pub session_ttl_secs: u64,
    /// How often the background sweeper scans the cache.
    pub sweep_interval_secs: u64,
    /// Maximum messages kept in an agent's conversation window.
    pub history_window: usize,
    /// Maximum model turns per run.
    pub max_iterations: usize,
    /// Capacity of the bounded per-run event channel.
    pub event_buffer: usize,
    /// Model used when a session has not picked one.
    pub default_model: Option<String>,
    /// Tool configuration for new sessions.
    pub tools: ToolConfig,
    /// Externally hosted tool servers, keyed by server name.
    pub mcp_servers: BTreeMap<String, ToolServerConfig>,
}

impl Default for AiboxConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 2 * 60 * 60,
            sweep_interval_secs: 300,
            history_window: 40,
            max_iterations: 20,
            event_buffer: 256,
            default_model: None,
            tools: ToolConfig::default(),
            mcp_servers: BTreeMap::new(),
        }
    }
}

impl AiboxConfig {
    /// Load defaults, then the config file, then the process environment.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .map(PathBuf::from)
            .or_else(default_config_path);

        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate TOML config text.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay environment values read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("AIBOX_SESSION_TTL_SECS") {
            self.session_ttl_secs = parse_env("AIBOX_SESSION_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("AIBOX_SWEEP_INTERVAL_SECS") {
            self.sweep_interval_secs = parse_env("AIBOX_SWEEP_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("AIBOX_HISTORY_WINDOW") {
            self.history_window = parse_env("AIBOX_HISTORY_WINDOW", &v)?;
        }
        if let Some(v) = lookup("AIBOX_MAX_ITERATIONS") {
            self.max_iterations = parse_env("AIBOX_MAX_ITERATIONS", &v)?;
        }
        if let Some(v) = lookup("AIBOX_DEFAULT_MODEL") {
            self.default_model = Some(v);
        }
        self.validate()
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_secs = interval.as_secs();
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_default_model(mut self, model_id: impl Into<String>) -> Self {
        self.default_model = Some(model_id.into());
        self
    }

    pub fn with_tools(mut self, tools: ToolConfig) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_mcp_server(mut self, name: impl Into<String>, server: ToolServerConfig) -> Self {
        self.mcp_servers.insert(name.into(), server);
        self
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.session_ttl_secs == 0 {
            return Err(AiboxError::Configuration(
                "session_ttl_secs must be greater than zero".into(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(AiboxError::Configuration(
                "sweep_interval_secs must be greater than zero".into(),
            ));
        }
        if self.max_iterations == 0 || self.event_buffer == 0 {
            return Err(AiboxError::Configuration(
                "max_iterations and event_buffer must be greater than zero".into(),
            ));
        }
        for (name, server) in &self.mcp_servers {
            server.validate(name)?;
        }
        Ok(())
    }
}

fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "aibox", "aibox")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AiboxError::Configuration(format!("{key} has an invalid value: {value}")))
}

/// Transport used to reach a tool server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ToolServerTransport {
    Stdio,
    Http,
    Sse,
}

/// Definition of one externally hosted tool server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolServerConfig {
    #[serde(rename = "type")]
    pub transport: ToolServerTransport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

impl ToolServerConfig {
    /// A server launched as a child process speaking over stdio.
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            transport: ToolServerTransport::Stdio,
            command: Some(command.into()),
            args,
            env: HashMap::new(),
            url: None,
            disabled: false,
        }
    }

    /// A server reached over streamable HTTP.
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            transport: ToolServerTransport::Http,
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            url: Some(url.into()),
            disabled: false,
        }
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    fn validate(&self, name: &str) -> Result<()> {
        match self.transport {
            ToolServerTransport::Stdio if self.command.is_none() => Err(
                AiboxError::Configuration(format!("tool server '{name}' (stdio) requires a command")),
            ),
            ToolServerTransport::Http | ToolServerTransport::Sse if self.url.is_none() => {
                Err(AiboxError::Configuration(format!(
                    "tool server '{name}' ({}) requires a url",
                    self.transport
                )))
            }
            _ => Ok(()),
        }
    }

    /// Stable digest of everything that determines the connection.
    ///
    /// Two servers with the same fingerprint share one pooled connection.
    /// The `disabled` flag is not part of the identity.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.transport.to_string().as_bytes());
        hasher.update([0]);
        if let Some(command) = &self.command {
            hasher.update(command.as_bytes());
        }
        hasher.update([0]);
        for arg in &self.args {
            hasher.update(arg.as_bytes());
            hasher.update([0]);
        }
        let mut env: Vec<_> = self.env.iter().collect();
        env.sort();
        for (key, value) in env {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update([0]);
        }
        if let Some(url) = &self.url {
            hasher.update(url.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_two_hour_ttl() {
        let config = AiboxConfig::default();
        assert_eq!(config.session_ttl(), Duration::from_secs(7200));
        assert_eq!(config.history_window, 40);
        assert_eq!(config.max_iterations, 20);
        assert!(config.tools.enabled);
        assert!(config.tools.builtin_enabled);
        assert!(!config.tools.mcp_enabled);
    }

    #[test]
    fn toml_file_overrides_defaults_and_accepts_aliases() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
session_ttl_secs = 60
default_model = "claude-sonnet"

[tools]
legacy_tools = ["get_weather", "search_internet"]
mcp_tools_enabled = true
strands_tools_enabled = false

[mcp_servers.exa]
type = "stdio"
command = "npx"
args = ["-y", "exa-mcp-server"]

[mcp_servers.remote]
type = "http"
url = "http://localhost:9000/mcp"
disabled = true
"#,
        )
        .expect("write config");

        let config = AiboxConfig::from_file(&path).expect("config should parse");

        assert_eq!(config.session_ttl_secs, 60);
        assert_eq!(config.sweep_interval_secs, 300);
        assert_eq!(config.default_model.as_deref(), Some("claude-sonnet"));
        assert_eq!(
            config.tools.legacy_tools,
            BTreeSet::from(["get_weather".to_string(), "search_internet".to_string()])
        );
        assert!(config.tools.mcp_enabled);
        assert!(!config.tools.builtin_enabled);
        assert_eq!(config.mcp_servers.len(), 2);
        assert!(config.mcp_servers["remote"].disabled);
    }

    #[test]
    fn stdio_server_without_command_is_rejected() {
        let err = AiboxConfig::from_toml_str(
            r#"
[mcp_servers.broken]
type = "stdio"
"#,
        )
        .expect_err("missing command should fail");
        assert!(matches!(err, AiboxError::Configuration(_)));
    }

    #[test]
    fn unknown_server_type_is_rejected() {
        let err = AiboxConfig::from_toml_str(
            r#"
[mcp_servers.odd]
type = "carrier-pigeon"
"#,
        )
        .expect_err("unknown type should fail");
        assert!(matches!(err, AiboxError::Toml(_)));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = AiboxConfig::from_toml_str("session_ttl_secs = 60").expect("parse");
        config
            .apply_env(|key| match key {
                "AIBOX_SESSION_TTL_SECS" => Some("120".into()),
                "AIBOX_DEFAULT_MODEL" => Some("gpt-4o".into()),
                _ => None,
            })
            .expect("env should apply");

        assert_eq!(config.session_ttl_secs, 120);
        assert_eq!(config.default_model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn invalid_env_value_is_a_configuration_error() {
        let mut config = AiboxConfig::default();
        let err = config
            .apply_env(|key| (key == "AIBOX_HISTORY_WINDOW").then(|| "many".to_string()))
            .expect_err("non-numeric window should fail");
        assert!(err.to_string().contains("AIBOX_HISTORY_WINDOW"));
    }

    #[test]
    fn fingerprint_ignores_disabled_flag_and_env_order() {
        let mut a = ToolServerConfig::stdio("npx", vec!["server".into()]);
        a.env.insert("A".into(), "1".into());
        a.env.insert("B".into(), "2".into());
        let mut b = ToolServerConfig::stdio("npx", vec!["server".into()]).disabled(true);
        b.env.insert("B".into(), "2".into());
        b.env.insert("A".into(), "1".into());

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(
            a.fingerprint(),
            ToolServerConfig::stdio("npx", vec!["other".into()]).fingerprint()
        );
    }
}
