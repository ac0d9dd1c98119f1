use super::process::ControlCommand;
use crate::debug::DebugBinding;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Status of a managed server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerState {
    /// No process
    #[default]
    Idle,
    /// Control script is being launched
    Starting,
    /// Process is live
    Running,
    /// A shutdown or reload command has been issued to the live process
    Stopping,
}

impl ServerState {
    /// Whether a server process exists in this state.
    pub fn is_live(self) -> bool {
        matches!(self, ServerState::Running | ServerState::Stopping)
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ServerState::Idle => "idle",
            ServerState::Starting => "starting",
            ServerState::Running => "running",
            ServerState::Stopping => "stopping",
        };
        f.write_str(label)
    }
}

/// One managed server instance.
///
/// This is plain data; presentation layers build their own views from it.
#[derive(Debug, Clone)]
pub struct ServerRecord {
    name: String,
    install_path: PathBuf,
    storage_path: PathBuf,
    pub(crate) state: ServerState,
    pub(crate) debugging: Option<DebugBinding>,
    pub(crate) pending_restart: bool,
    /// Management command currently sent to the process.
    pub(crate) in_flight: Option<ControlCommand>,
    /// A shutdown must follow once the reload in flight returns.
    pub(crate) shutdown_queued: bool,
    pub(crate) base_url_context: Option<String>,
    pub(crate) jvm_options: Vec<String>,
}

impl ServerRecord {
    pub fn new(name: impl Into<String>, install_path: impl Into<PathBuf>, storage_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            install_path: install_path.into(),
            storage_path: storage_path.into(),
            state: ServerState::Idle,
            debugging: None,
            pending_restart: false,
            in_flight: None,
            shutdown_queued: false,
            base_url_context: None,
            jvm_options: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn install_path(&self) -> &Path {
        &self.install_path
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    /// Stable identity of the instance: the last component of its storage path.
    ///
    /// Unlike the name it never changes, so background tasks and debug
    /// sessions are keyed by it.
    pub fn instance_id(&self) -> String {
        self.storage_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.storage_path.to_string_lossy().into_owned())
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn is_started(&self) -> bool {
        self.state.is_live()
    }

    pub fn debugging(&self) -> Option<&DebugBinding> {
        self.debugging.as_ref()
    }

    pub fn is_debugging(&self) -> bool {
        self.debugging.is_some()
    }

    pub fn pending_restart(&self) -> bool {
        self.pending_restart
    }

    /// Management command the process is currently executing, if any.
    pub fn command_in_flight(&self) -> Option<ControlCommand> {
        self.in_flight
    }

    /// Forgets every request waiting on the current process.
    pub(crate) fn clear_requests(&mut self) {
        self.pending_restart = false;
        self.in_flight = None;
        self.shutdown_queued = false;
    }

    pub fn base_url_context(&self) -> Option<&str> {
        self.base_url_context.as_deref()
    }

    /// Options passed to the last launch.
    pub fn jvm_options(&self) -> &[String] {
        &self.jvm_options
    }

    /// Directory receiving deployed artifacts.
    pub fn deployments_dir(&self) -> PathBuf {
        self.storage_path.join("standalone").join("deployments")
    }

    pub(crate) fn to_persisted(&self) -> PersistedRecord {
        PersistedRecord {
            name: self.name.clone(),
            install_path: self.install_path.clone(),
            storage_path: self.storage_path.clone(),
        }
    }
}

/// Shape of one entry in `servers.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRecord {
    #[serde(alias = "_name")]
    pub name: String,
    #[serde(alias = "_installPath")]
    pub install_path: PathBuf,
    #[serde(alias = "_storagePath")]
    pub storage_path: PathBuf,
}

impl From<PersistedRecord> for ServerRecord {
    fn from(persisted: PersistedRecord) -> Self {
        ServerRecord::new(persisted.name, persisted.install_path, persisted.storage_path)
    }
}
