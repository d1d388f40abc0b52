//! Daemon configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use cueboard_core::GridConfig;
use cueboard_switcher::{Backoff, ConnectionConfig};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "CUEBOARD_CONFIG";

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Daemon settings
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Client-facing TCP server
    #[serde(default)]
    pub server: ServerConfig,
    /// Switcher control connection
    #[serde(default)]
    pub switcher: SwitcherConfig,
    /// Status polling
    #[serde(default)]
    pub status: StatusConfig,
    /// Session reclamation
    #[serde(default)]
    pub sessions: SessionsConfig,
    /// Layout of the seeded default configuration
    #[serde(default)]
    pub layout: LayoutConfig,
}

/// Daemon-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self { log_level: default_log_level() }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Address the TCP server binds to
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { listen: default_listen() }
    }
}

fn default_listen() -> String {
    cueboard_ipc::DEFAULT_LISTEN_ADDR.to_string()
}

/// Which switcher implementation to drive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Obs,
    Simulated,
}

/// Switcher connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwitcherConfig {
    #[serde(default)]
    pub backend: BackendKind,
    /// WebSocket URL of the switcher
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,
}

impl Default for SwitcherConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            url: default_url(),
            password: None,
            command_timeout_ms: default_command_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            backoff_jitter: default_backoff_jitter(),
        }
    }
}

impl SwitcherConfig {
    /// Timing settings for the switcher connection.
    #[must_use]
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            command_timeout: Duration::from_millis(self.command_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            backoff: Backoff {
                initial: Duration::from_millis(self.backoff_initial_ms),
                max: Duration::from_millis(self.backoff_max_ms),
                multiplier: self.backoff_multiplier,
                jitter: self.backoff_jitter,
            },
        }
    }
}

fn default_url() -> String {
    "ws://127.0.0.1:4455".to_string()
}

fn default_command_timeout_ms() -> u64 {
    5000
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_backoff_initial_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_backoff_jitter() -> f64 {
    0.2
}

/// Status polling settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Deadline for a single status query
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self { poll_interval_ms: default_poll_interval_ms(), query_timeout_ms: default_query_timeout_ms() }
    }
}

impl StatusConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    #[must_use]
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_query_timeout_ms() -> u64 {
    2000
}

/// Session reclamation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionsConfig {
    /// Idle time after which a session is reclaimed
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self { idle_ttl_secs: default_idle_ttl_secs(), sweep_interval_secs: default_sweep_interval_secs() }
    }
}

impl SessionsConfig {
    #[must_use]
    pub fn idle_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.idle_ttl_secs).unwrap_or(i64::MAX))
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

fn default_idle_ttl_secs() -> u64 {
    86_400
}

fn default_sweep_interval_secs() -> u64 {
    60
}

/// Grid of the configuration seeded into an empty store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LayoutConfig {
    #[serde(default = "default_rows")]
    pub default_rows: u32,
    #[serde(default = "default_cols")]
    pub default_cols: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self { default_rows: default_rows(), default_cols: default_cols() }
    }
}

impl LayoutConfig {
    #[must_use]
    pub fn grid(&self) -> GridConfig {
        GridConfig::new(self.default_rows, self.default_cols)
    }
}

fn default_rows() -> u32 {
    3
}

fn default_cols() -> u32 {
    4
}

/// Load configuration from file or defaults.
///
/// `CUEBOARD_CONFIG` names the file explicitly; otherwise the per-user
/// config directory is used.
pub fn load_config() -> Result<Config> {
    let config_path = match std::env::var_os(CONFIG_ENV) {
        Some(path) => PathBuf::from(path),
        None => config_path()?,
    };
    load_config_from(&config_path)
}

/// Load configuration from `config_path`, falling back to defaults when the
/// file does not exist.
pub fn load_config_from(config_path: &Path) -> Result<Config> {
    if config_path.exists() {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {config_path:?}"))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {config_path:?}"))?;
        Ok(config)
    } else {
        info!(?config_path, "Config file not found, using defaults");
        Ok(Config::default())
    }
}

/// Get the configuration file path.
fn config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("com", "cueboard", "Cueboard").context("Could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}
