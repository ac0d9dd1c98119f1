//! Ordered collection of server records mirrored to `servers.json`.
//!
//! The in-memory list is authoritative. Every mutation is followed by a
//! best-effort write; a failed write is logged and the mutation stays.

use crate::config::validator::validate_server_name;
use crate::error::{Error, Result};
use crate::server::record::PersistedRecord;
use crate::server::ServerRecord;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared handle to the server list.
#[derive(Debug, Clone)]
pub struct ServerStore {
    file: Arc<PathBuf>,
    records: Arc<Mutex<Vec<ServerRecord>>>,
}

impl ServerStore {
    /// Creates an empty store persisting to `file`.
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: Arc::new(file.into()),
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Loads the store from `file`.
    ///
    /// A missing file gives an empty store. So does a corrupt one, after a warning.
    #[tracing::instrument(skip(file), fields(path = %file.as_ref().display()))]
    pub fn load(file: impl AsRef<Path>) -> Self {
        let store = Self::new(file.as_ref());
        let records = match std::fs::read_to_string(file.as_ref()) {
            Ok(content) => match serde_json::from_str::<Vec<PersistedRecord>>(&content) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(error = %e, "Server list is corrupt, starting empty");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read server list, starting empty");
                Vec::new()
            }
        };

        tracing::info!(num_servers = records.len(), "Loaded server list");
        if let Ok(mut guard) = store.records.lock() {
            *guard = records.into_iter().map(ServerRecord::from).collect();
        }
        store
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<ServerRecord>>> {
        self.records
            .lock()
            .map_err(|_| Error::Other("Failed to lock server list".to_string()))
    }

    /// Snapshot of all records in insertion order.
    pub fn list(&self) -> Result<Vec<ServerRecord>> {
        Ok(self.lock()?.clone())
    }

    pub fn names(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.iter().map(|r| r.name().to_string()).collect())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn find(&self, name: &str) -> Result<Option<ServerRecord>> {
        Ok(self.lock()?.iter().find(|r| r.name() == name).cloned())
    }

    pub fn find_instance(&self, instance_id: &str) -> Result<Option<ServerRecord>> {
        Ok(self
            .lock()?
            .iter()
            .find(|r| r.instance_id() == instance_id)
            .cloned())
    }

    /// Applies `change` to the record named `name`.
    pub fn update<T>(&self, name: &str, change: impl FnOnce(&mut ServerRecord) -> T) -> Result<T> {
        let mut records = self.lock()?;
        let record = records
            .iter_mut()
            .find(|r| r.name() == name)
            .ok_or_else(|| Error::ServerNotFound(name.to_string()))?;
        Ok(change(record))
    }

    /// Applies `change` to the record with `instance_id`.
    pub fn update_instance<T>(&self, instance_id: &str, change: impl FnOnce(&mut ServerRecord) -> T) -> Result<T> {
        let mut records = self.lock()?;
        let record = records
            .iter_mut()
            .find(|r| r.instance_id() == instance_id)
            .ok_or_else(|| Error::ServerNotFound(instance_id.to_string()))?;
        Ok(change(record))
    }

    /// Adds `record`, replacing any record with the same name, then persists.
    #[tracing::instrument(skip(self, record), fields(server_name = %record.name()))]
    pub async fn add(&self, record: ServerRecord) -> Result<()> {
        {
            let mut records = self.lock()?;
            records.retain(|r| r.name() != record.name());
            records.push(record);
        }
        self.persist_logged().await;
        Ok(())
    }

    /// Removes the record named `name` together with its storage directory.
    ///
    /// Returns `false` when there is no such record.
    #[tracing::instrument(skip(self), fields(server_name = %name))]
    pub async fn remove(&self, name: &str) -> Result<bool> {
        let removed = {
            let mut records = self.lock()?;
            match records.iter().position(|r| r.name() == name) {
                Some(index) => records.remove(index),
                None => return Ok(false),
            }
        };

        if let Err(e) = tokio::fs::remove_dir_all(removed.storage_path()).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %removed.storage_path().display(),
                    error = %e,
                    "Failed to remove server storage"
                );
            }
        }
        self.persist_logged().await;
        tracing::info!("Server removed");
        Ok(true)
    }

    /// Renames a record and waits until the list is persisted.
    #[tracing::instrument(skip(self), fields(server_name = %name))]
    pub async fn rename(&self, name: &str, new_name: &str) -> Result<()> {
        validate_server_name(new_name)?;
        {
            let mut records = self.lock()?;
            let index = records
                .iter()
                .position(|r| r.name() == name)
                .ok_or_else(|| Error::ServerNotFound(name.to_string()))?;
            if records
                .iter()
                .enumerate()
                .any(|(i, r)| i != index && r.name() == new_name)
            {
                return Err(Error::NameTaken(new_name.to_string()));
            }
            records[index].set_name(new_name.to_string());
        }
        self.persist_logged().await;
        tracing::info!(%new_name, "Server renamed");
        Ok(())
    }

    fn serialize(&self) -> Result<String> {
        let persisted: Vec<PersistedRecord> = self.lock()?.iter().map(ServerRecord::to_persisted).collect();
        serde_json::to_string_pretty(&persisted).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Writes the list to disk.
    pub async fn persist(&self) -> Result<()> {
        let json = self.serialize()?;
        if let Some(parent) = self.file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Persistence(format!("{}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(self.file.as_path(), json)
            .await
            .map_err(|e| Error::Persistence(format!("{}: {}", self.file.display(), e)))
    }

    /// Writes the list to disk without an async runtime, for shutdown paths.
    pub fn persist_sync(&self) -> Result<()> {
        let json = self.serialize()?;
        if let Some(parent) = self.file.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Persistence(format!("{}: {}", parent.display(), e)))?;
        }
        std::fs::write(self.file.as_path(), json)
            .map_err(|e| Error::Persistence(format!("{}: {}", self.file.display(), e)))
    }

    async fn persist_logged(&self) {
        if let Err(e) = self.persist().await {
            tracing::warn!(error = %e, "Failed to persist server list");
        }
    }
}
