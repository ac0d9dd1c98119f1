use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How a restart request is carried out by the control script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RestartMode {
    /// Ask the running server to reload in place (`command=:reload`).
    #[default]
    Reload,
    /// Shut the server down (`command=:shutdown`) and launch a fresh process.
    Relaunch,
}

/// Main configuration for the WildFly Runner.
///
/// Only `storageRoot` is required; every other field has a default.
///
/// # JSON Schema
///
/// ```json
/// {
///   "storageRoot": "/home/me/.wildfly-runner",
///   "restartMode": "relaunch",
///   "watchIntervalMs": 500,
///   "defaultDebugPort": 8787,
///   "attachDelayMs": 500,
///   "stopTimeoutSecs": 60
/// }
/// ```
///
/// # Examples
///
/// ```
/// use wildfly_runner::config::{RestartMode, RunnerConfig};
///
/// let config = RunnerConfig::parse_from_str(r#"{ "storageRoot": "/tmp/wildfly" }"#).unwrap();
/// assert_eq!(config.restart_mode, RestartMode::Reload);
/// assert_eq!(config.default_debug_port, 8787);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerConfig {
    /// Directory holding `servers.json`, `settings.json` and the per-server copies.
    pub storage_root: PathBuf,

    /// How `restart` is issued to a running server.
    #[serde(default)]
    pub restart_mode: RestartMode,

    /// Poll interval of the configuration watcher, in milliseconds.
    #[serde(default = "default_watch_interval_ms")]
    pub watch_interval_ms: u64,

    /// Debug port used when a deployment asks for debugging.
    #[serde(default = "default_debug_port")]
    pub default_debug_port: u16,

    /// Delay between launching a debug-enabled server and attaching the debugger.
    #[serde(default = "default_attach_delay_ms")]
    pub attach_delay_ms: u64,

    /// How long `delete_server` waits for a running server to stop.
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

fn default_watch_interval_ms() -> u64 {
    500
}

fn default_debug_port() -> u16 {
    8787
}

fn default_attach_delay_ms() -> u64 {
    500
}

fn default_stop_timeout_secs() -> u64 {
    60
}

impl RunnerConfig {
    /// Creates a configuration with default settings rooted at `storage_root`.
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            restart_mode: RestartMode::default(),
            watch_interval_ms: default_watch_interval_ms(),
            default_debug_port: default_debug_port(),
            attach_delay_ms: default_attach_delay_ms(),
            stop_timeout_secs: default_stop_timeout_secs(),
        }
    }

    /// Loads a configuration from a file path.
    ///
    /// Files ending in `.yaml` or `.yml` are read as YAML, everything else as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file cannot be read
    /// * The file contents do not match the expected schema
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::parse_from_yaml(&content),
            _ => Self::parse_from_str(&content),
        }
    }

    /// Parses a configuration from a JSON string.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse JSON config: {}", e)))
    }

    /// Parses a configuration from a YAML string.
    pub fn parse_from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse YAML config: {}", e)))
    }

    /// Path of the persisted server list.
    pub fn servers_file(&self) -> PathBuf {
        self.storage_root.join("servers.json")
    }

    /// Path of the persisted user preferences.
    pub fn settings_file(&self) -> PathBuf {
        self.storage_root.join("settings.json")
    }

    /// Parent directory of every provisioned server copy.
    pub fn servers_dir(&self) -> PathBuf {
        self.storage_root.join("wildfly")
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }

    pub fn attach_delay(&self) -> Duration {
        Duration::from_millis(self.attach_delay_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}
