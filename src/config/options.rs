//! The per-server `jvm.options` file.
//!
//! One flag per line. Lines that do not start with `-` are ignored, as are
//! flags the runner manages itself.

use crate::error::Result;
use std::path::{Path, PathBuf};

/// File name of the option file inside a server's storage path.
pub const JVM_OPTION_FILE: &str = "jvm.options";

/// Flag selecting an alternative configuration file.
pub const SERVER_CONFIG_PARAM: &str = "--server-config=";

/// Configuration file used when no `--server-config=` flag is present.
pub const DEFAULT_SERVER_CONFIG: &str = "standalone.xml";

/// Option prefixes that are never passed through.
pub const MANAGED_OPTION_KEYS: [&str; 3] = ["-classpath", "-Djboss.server.base.dir", "-Djboss.home.dir"];

/// Content written when a server has no option file yet.
pub const DEFAULT_JVM_OPTIONS: &str = "\
# Options passed to bin/standalone for this server, one per line.
# Lines that do not start with '-' are ignored.
# Use --server-config=<file> to run a configuration other than standalone.xml.
-Djboss.bind.address.management=127.0.0.1
";

/// Path of the option file for a server stored at `storage_path`.
pub fn jvm_option_file(storage_path: &Path) -> PathBuf {
    storage_path.join(JVM_OPTION_FILE)
}

/// Whether an option line is passed to the control script.
pub fn is_effective_option(line: &str) -> bool {
    line.starts_with('-') && !MANAGED_OPTION_KEYS.iter().any(|key| line.starts_with(key))
}

/// Filters option file content down to the effective options, in order.
pub fn parse_jvm_options(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| is_effective_option(line))
        .map(str::to_string)
        .collect()
}

/// Reads the effective options of the server stored at `storage_path`.
///
/// A missing option file yields no options.
pub async fn read_jvm_options(storage_path: &Path) -> Result<Vec<String>> {
    let path = jvm_option_file(storage_path);
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Ok(parse_jvm_options(&content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No option file, using no options");
            Ok(Vec::new())
        }
        Err(e) => Err(e.into()),
    }
}

/// The configuration file name selected by `options`.
pub fn server_config_name(options: &[String]) -> &str {
    options
        .iter()
        .find_map(|option| option.strip_prefix(SERVER_CONFIG_PARAM))
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_SERVER_CONFIG)
}

/// Directory holding the configuration files of a server copy.
pub fn configuration_dir(storage_path: &Path) -> PathBuf {
    storage_path.join("standalone").join("configuration")
}

/// Resolves the active configuration file of the server stored at `storage_path`.
pub async fn server_config_path(storage_path: &Path) -> Result<PathBuf> {
    let options = read_jvm_options(storage_path).await?;
    Ok(configuration_dir(storage_path).join(server_config_name(&options)))
}

/// Writes the default option file unless one exists, returning its path.
pub async fn ensure_jvm_option_file(storage_path: &Path) -> Result<PathBuf> {
    let path = jvm_option_file(storage_path);
    if !tokio::fs::try_exists(&path).await? {
        tokio::fs::write(&path, DEFAULT_JVM_OPTIONS).await?;
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filters_comments_and_managed_keys() {
        let content = "# comment\n-Xmx1g\n\n-classpath /x\n  -Dfoo=bar  \n-Djboss.home.dir=/opt\nnot-a-flag\n--server-config=standalone-full.xml\n";

        assert_eq!(
            parse_jvm_options(content),
            vec!["-Xmx1g", "-Dfoo=bar", "--server-config=standalone-full.xml"]
        );
    }

    #[test]
    fn test_server_config_name() {
        let options = vec!["-Xmx1g".to_string(), "--server-config=standalone-ha.xml".to_string()];
        assert_eq!(server_config_name(&options), "standalone-ha.xml");
        assert_eq!(server_config_name(&[]), DEFAULT_SERVER_CONFIG);
        assert_eq!(server_config_name(&["--server-config=".to_string()]), DEFAULT_SERVER_CONFIG);
    }

    #[test]
    fn test_default_options_are_effective() {
        assert_eq!(
            parse_jvm_options(DEFAULT_JVM_OPTIONS),
            vec!["-Djboss.bind.address.management=127.0.0.1"]
        );
    }

    #[tokio::test]
    async fn test_server_config_path_without_option_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = server_config_path(dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join("standalone/configuration/standalone.xml"));
    }
}
