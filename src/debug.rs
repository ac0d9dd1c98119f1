//! Debug-session binding.
//!
//! A record carries a [`DebugBinding`] while a deployment asked for debugging.
//! The binding only records the attach parameters; launching the debugger is
//! left to a [`DebugLauncher`](crate::host::DebugLauncher).

use crate::server::ServerRecord;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix of every debug session name created by the runner.
pub const DEBUG_SESSION_NAME: &str = "Wildfly Debug (Attach)";

/// Host the debugger attaches to.
pub const DEBUG_HOST: &str = "localhost";

/// Attach timeout handed to the debugger.
pub const ATTACH_TIMEOUT_MS: u64 = 1000;

/// Debug port and workspace folder bound to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugBinding {
    pub port: u16,
    pub workspace: PathBuf,
}

/// Parameters of a debugger attach request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachConfig {
    pub name: String,
    pub host_name: String,
    pub port: u16,
    pub timeout_ms: u64,
    pub workspace: PathBuf,
}

pub fn bind(record: &mut ServerRecord, port: u16, workspace: impl Into<PathBuf>) {
    record.debugging = Some(DebugBinding {
        port,
        workspace: workspace.into(),
    });
}

pub fn unbind(record: &mut ServerRecord) {
    record.debugging = None;
}

pub fn is_debugging(record: &ServerRecord) -> bool {
    record.debugging.is_some()
}

/// Debug session name of an instance.
pub fn session_name(instance_id: &str) -> String {
    format!("{}_{}", DEBUG_SESSION_NAME, instance_id)
}

/// Instance id encoded in a session name, if the session was created by the runner.
pub fn session_instance(session_name: &str) -> Option<&str> {
    session_name
        .strip_prefix(DEBUG_SESSION_NAME)?
        .strip_prefix('_')
        .filter(|id| !id.is_empty())
}

/// Attach parameters for a record, if it is bound.
pub fn attach_config(record: &ServerRecord) -> Option<AttachConfig> {
    let binding = record.debugging.as_ref()?;
    Some(AttachConfig {
        name: session_name(&record.instance_id()),
        host_name: DEBUG_HOST.to_string(),
        port: binding.port,
        timeout_ms: ATTACH_TIMEOUT_MS,
        workspace: binding.workspace.clone(),
    })
}

/// The workspace folder containing `artifact`, if any.
pub fn resolve_workspace(folders: &[PathBuf], artifact: &Path) -> Option<PathBuf> {
    folders
        .iter()
        .find(|folder| artifact.starts_with(folder))
        .cloned()
}
