use crate::config::RunnerConfig;
use crate::error::{Error, Result};
use std::path::Path;

/// Validates a server name: non-empty, only `[A-Za-z0-9_.-]`.
pub fn validate_server_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}

/// Normalizes a base URL context: trimmed, without leading `/`.
///
/// The context must be one token of text; whitespace inside it is rejected.
pub fn validate_url_context(context: &str) -> Result<String> {
    let trimmed = context.trim();
    if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::InvalidUrlContext(context.to_string()));
    }
    Ok(trimmed.trim_start_matches('/').to_string())
}

/// Checks that `path` looks like a WildFly installation.
pub async fn validate_install_path(path: &Path) -> Result<()> {
    let required = [
        path.join("jboss-modules.jar"),
        path.join("bin"),
        path.join("standalone"),
    ];
    for entry in &required {
        if !tokio::fs::try_exists(entry).await.unwrap_or(false) {
            tracing::debug!(missing = %entry.display(), "Install path rejected");
            return Err(Error::InvalidInstallPath(path.to_path_buf()));
        }
    }
    Ok(())
}

/// Full configuration validation
pub fn validate_config(config: &RunnerConfig) -> Result<()> {
    if config.storage_root.as_os_str().is_empty() {
        return Err(Error::ConfigInvalid("storageRoot must not be empty".to_string()));
    }
    if config.watch_interval_ms == 0 {
        return Err(Error::ConfigInvalid("watchIntervalMs must be positive".to_string()));
    }
    if config.default_debug_port == 0 {
        return Err(Error::ConfigInvalid("defaultDebugPort must be positive".to_string()));
    }

    Ok(())
}
