//! Process-wide user preferences.
//!
//! Loaded once when the runner is created, mutated in memory and flushed to
//! `settings.json` on every change. A missing or unreadable file means defaults.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Persisted preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Offer a restart when the http(s) port of a running server changes.
    #[serde(default = "enabled")]
    pub restart_on_http_port_change: bool,
}

fn enabled() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            restart_on_http_port_change: true,
        }
    }
}

/// Shared handle to the preferences and their file.
#[derive(Debug, Clone)]
pub struct SettingsService {
    file: Arc<PathBuf>,
    settings: Arc<Mutex<Settings>>,
}

impl SettingsService {
    /// Loads the preferences from `file`, falling back to defaults.
    pub fn load(file: impl Into<PathBuf>) -> Self {
        let file = file.into();
        let settings = match std::fs::read_to_string(&file) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %file.display(), error = %e, "Ignoring unreadable settings");
                Settings::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
            Err(e) => {
                tracing::warn!(path = %file.display(), error = %e, "Failed to read settings");
                Settings::default()
            }
        };

        Self {
            file: Arc::new(file),
            settings: Arc::new(Mutex::new(settings)),
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn current(&self) -> Result<Settings> {
        self.settings
            .lock()
            .map(|settings| *settings)
            .map_err(|_| Error::Other("Failed to lock settings".to_string()))
    }

    /// Whether http(s) port changes should still be offered a restart.
    pub fn restart_prompts_enabled(&self) -> bool {
        self.current()
            .map(|settings| settings.restart_on_http_port_change)
            .unwrap_or(true)
    }

    /// Turns off restart prompts for http(s) port changes and flushes the file.
    pub async fn disable_restart_prompts(&self) -> Result<()> {
        self.update(|settings| settings.restart_on_http_port_change = false)
            .await
    }

    /// Applies `change` in memory, then writes the file.
    ///
    /// A failed write is returned but the in-memory change stays.
    pub async fn update(&self, change: impl FnOnce(&mut Settings)) -> Result<()> {
        let snapshot = {
            let mut settings = self
                .settings
                .lock()
                .map_err(|_| Error::Other("Failed to lock settings".to_string()))?;
            change(&mut settings);
            *settings
        };

        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        if let Some(parent) = self.file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Persistence(format!("{}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(self.file.as_path(), json)
            .await
            .map_err(|e| Error::Persistence(format!("{}: {}", self.file.display(), e)))
    }
}
