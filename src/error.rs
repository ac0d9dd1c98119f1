/// Error handling module for WildFly Runner.
///
/// This module defines the error types used throughout the library.
/// Conditions that are not failures (a dismissed pick, a server that is
/// already in the requested state) are reported through
/// [`Outcome`](crate::server::Outcome) instead, so callers can always tell
/// "nothing to do" apart from "something went wrong".
///
/// # Example
///
/// ```
/// use wildfly_runner::error::{Error, Result};
///
/// fn handle_error(result: Result<()>) {
///     match result {
///         Ok(_) => println!("Operation succeeded"),
///         Err(Error::NoServer) => println!("Add a server first"),
///         Err(Error::ServerNotFound(name)) => println!("Server '{}' is not registered", name),
///         Err(Error::ConfigNotFound(path)) => println!("No configuration at {}", path.display()),
///         Err(e) => println!("Other error: {}", e),
///     }
/// }
/// ```
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the wildfly-runner library.
#[derive(Error, Debug)]
pub enum Error {
    /// No server has been registered yet.
    #[error("There are no Wildfly servers.")]
    NoServer,

    /// Requested server is not in the store.
    ///
    /// This error occurs when:
    /// - A name is passed that no record carries
    /// - A record was deleted while a background task still referenced it
    #[error("Server not found: {0}")]
    ServerNotFound(String),

    /// The server configuration file does not exist (yet).
    #[error("Server configuration not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// Failed to parse a configuration file.
    ///
    /// This error occurs when:
    /// - The runner configuration is malformed JSON or YAML
    /// - The server XML is malformed
    /// - The XML has no socket binding for the requested port
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration parsed but contains invalid values.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A server name contains characters outside `[A-Za-z0-9_.-]`.
    #[error("Invalid server name: '{0}'")]
    InvalidName(String),

    /// A server name is already used by another record.
    #[error("The name '{0}' was already taken")]
    NameTaken(String),

    /// The selected directory is not a WildFly installation.
    #[error("Please make sure you select a valid Wildfly directory: {}", .0.display())]
    InvalidInstallPath(PathBuf),

    /// Text entered as a base URL context is not a valid path.
    #[error("Please input a valid url context: '{0}'")]
    InvalidUrlContext(String),

    /// The artifact cannot be deployed.
    ///
    /// This error occurs when:
    /// - The file is not a `.war` package
    /// - The folder is not an exploded web application
    /// - The artifact is outside every workspace folder when debugging
    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    /// Error when starting, stopping, or talking to a server process.
    ///
    /// This error occurs when:
    /// - The control script cannot be spawned
    /// - The control script exits with a non-zero status
    #[error("Server process error: {0}")]
    Process(String),

    /// The server list or settings could not be written.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Error in serializing or deserializing data.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Underlying filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error not covered by the above categories.
    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Whether this error signals something missing rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NoServer | Error::ServerNotFound(_) | Error::ConfigNotFound(_)
        )
    }
}

/// Result type for wildfly-runner operations.
pub type Result<T> = std::result::Result<T, Error>;
