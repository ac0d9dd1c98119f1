//! Provisioning private server copies from a WildFly installation.

use crate::config::options;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Entries copied from an installation into a server copy.
pub const COPIED_ENTRIES: [&str; 5] = ["jboss-modules.jar", "bin", "domain", "modules", "standalone"];

/// Directories of `standalone` that a fresh copy starts without.
pub const RESET_DIRS: [&str; 4] = ["data", "deployments", "log", "tmp"];

/// Creates the writable copy a server runs from.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Fills `storage_path` from the installation at `install_path`.
    async fn provision(&self, install_path: &Path, storage_path: &Path) -> Result<()>;
}

/// Copies the installation file by file.
#[derive(Debug, Default, Clone, Copy)]
pub struct CopyProvisioner;

#[async_trait]
impl Provisioner for CopyProvisioner {
    #[tracing::instrument(skip(self), fields(from = %install_path.display(), to = %storage_path.display()))]
    async fn provision(&self, install_path: &Path, storage_path: &Path) -> Result<()> {
        let from = install_path.to_path_buf();
        let to = storage_path.to_path_buf();
        tokio::task::spawn_blocking(move || copy_installation(&from, &to))
            .await
            .map_err(|e| Error::Other(format!("Provisioning task failed: {}", e)))??;

        options::ensure_jvm_option_file(storage_path).await?;
        tracing::info!("Server copy provisioned");
        Ok(())
    }
}

fn copy_installation(install_path: &Path, storage_path: &Path) -> Result<()> {
    std::fs::create_dir_all(storage_path)?;
    for entry in COPIED_ENTRIES {
        let source = install_path.join(entry);
        if !source.exists() {
            tracing::debug!(entry, "Not present in installation, skipped");
            continue;
        }
        copy_recursive(&source, &storage_path.join(entry))?;
    }

    let standalone = storage_path.join("standalone");
    for dir in RESET_DIRS {
        let path = standalone.join(dir);
        match std::fs::remove_dir_all(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        std::fs::create_dir_all(&path)?;
    }
    Ok(())
}

fn copy_recursive(source: &Path, target: &Path) -> Result<()> {
    let metadata = std::fs::metadata(source)?;
    if metadata.is_dir() {
        std::fs::create_dir_all(target)?;
        for entry in std::fs::read_dir(source)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &target.join(entry.file_name()))?;
        }
    } else {
        // Permissions come along, so copied scripts stay executable.
        std::fs::copy(source, target)?;
    }
    Ok(())
}

/// `base`, or `base-1`, `base-2`, ... whichever is not taken.
pub fn unique_server_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Default server name for an installation: its directory name, reduced to
/// the characters a server name may contain.
pub fn default_server_name(install_path: &Path) -> String {
    let raw = install_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "wildfly".to_string()
    } else {
        cleaned
    }
}

/// Picks a name and storage path for a new copy of `install_path`.
///
/// The name is unique among `existing` names and its storage directory under
/// `servers_dir` does not exist yet.
pub fn allocate(install_path: &Path, existing: &[String], servers_dir: &Path) -> (String, PathBuf) {
    let base = default_server_name(install_path);
    let name = unique_server_name(&base, |candidate| {
        existing.iter().any(|name| name == candidate) || servers_dir.join(candidate).exists()
    });
    let storage_path = servers_dir.join(&name);
    (name, storage_path)
}
