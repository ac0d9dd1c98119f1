//! Web application artifacts.
//!
//! A server copy deploys exactly one artifact: deploying replaces the whole
//! content of `standalone/deployments`.

use crate::error::{Error, Result};
use crate::host::OutputSink;
use async_process::{Command, Stdio};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const WAR_FILE_EXTENSION: &str = "war";

/// What kind of web application a path holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebappKind {
    /// A packaged `.war` file.
    War,
    /// An exploded web application folder.
    Exploded,
}

pub fn is_war_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(WAR_FILE_EXTENSION))
}

/// Checks that `path` is a `.war` file or a folder with `WEB-INF/web.xml`.
pub async fn validate_webapp(path: &Path) -> Result<WebappKind> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|_| Error::InvalidArtifact(format!("{} does not exist", path.display())))?;

    if metadata.is_file() {
        if is_war_file(path) {
            return Ok(WebappKind::War);
        }
        return Err(Error::InvalidArtifact("Please select a .war file.".to_string()));
    }

    if tokio::fs::try_exists(path.join("WEB-INF").join("web.xml")).await? {
        Ok(WebappKind::Exploded)
    } else {
        Err(Error::InvalidArtifact(
            "The folder is not a valid web app to run on Wildfly Server.".to_string(),
        ))
    }
}

/// Replaces the content of `deployments_dir` with the single file `war`.
///
/// Returns the path of the deployed copy.
#[tracing::instrument(fields(war = %war.display()))]
pub async fn deploy_war(deployments_dir: &Path, war: &Path) -> Result<PathBuf> {
    if !is_war_file(war) {
        return Err(Error::InvalidArtifact("Please select a .war file.".to_string()));
    }
    let file_name = war
        .file_name()
        .ok_or_else(|| Error::InvalidArtifact(format!("{} has no file name", war.display())))?;

    // Staged next to the directory: the artifact may live inside it.
    let staged = deployments_dir.with_file_name(format!(
        ".{}.deploying",
        file_name.to_string_lossy()
    ));
    tokio::fs::copy(war, &staged).await?;

    match tokio::fs::remove_dir_all(deployments_dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(e.into());
        }
    }
    tokio::fs::create_dir_all(deployments_dir).await?;

    let target = deployments_dir.join(file_name);
    tokio::fs::rename(&staged, &target).await?;
    tracing::info!(target = %target.display(), "Artifact deployed");
    Ok(target)
}

/// Deployed `.war` files, sorted by name.
pub async fn list_deployments(deployments_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(deployments_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut wars = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if is_war_file(&path) {
            wars.push(path);
        }
    }
    wars.sort();
    Ok(wars)
}

/// File name of the package `name`, given with or without `.war`.
///
/// Anything but a plain file name is rejected.
pub fn package_file_name(name: &str) -> Result<PathBuf> {
    let mut components = Path::new(name).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    );
    if !plain || name.contains(['/', '\\']) {
        return Err(Error::InvalidArtifact(format!("'{}' is not a package name", name)));
    }
    if is_war_file(Path::new(name)) {
        Ok(PathBuf::from(name))
    } else {
        Ok(PathBuf::from(format!("{}.{}", name, WAR_FILE_EXTENSION)))
    }
}

/// Removes the deployed package `name` (with or without `.war`).
///
/// Returns `false` if it was not deployed.
pub async fn delete_deployment(deployments_dir: &Path, name: &str) -> Result<bool> {
    let file = deployments_dir.join(package_file_name(name)?);
    match tokio::fs::remove_file(&file).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Packages a folder into a web archive.
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Packages `folder` into `<folder>/<name>.war` and returns the archive path.
    async fn package(&self, folder: &Path, name: &str) -> Result<PathBuf>;
}

/// Packages with the JDK `jar` tool, run inside the folder.
pub struct JarArchiver {
    output: Arc<dyn OutputSink>,
}

impl JarArchiver {
    pub fn new(output: Arc<dyn OutputSink>) -> Self {
        Self { output }
    }
}

#[async_trait]
impl Archiver for JarArchiver {
    async fn package(&self, folder: &Path, name: &str) -> Result<PathBuf> {
        let archive = format!("{}.{}", name, WAR_FILE_EXTENSION);
        let output = Command::new("jar")
            .arg("cvf")
            .arg(&archive)
            .arg(".")
            .current_dir(folder)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Process(format!("Failed to run jar: {}", e)))?;

        for line in String::from_utf8_lossy(&output.stdout)
            .lines()
            .chain(String::from_utf8_lossy(&output.stderr).lines())
        {
            self.output.append_line(name, line);
        }

        if !output.status.success() {
            return Err(Error::Process(format!("jar exited with {}", output.status)));
        }
        Ok(folder.join(archive))
    }
}
