//! Interfaces to the hosting application.
//!
//! The runner never talks to a user directly. Choices, debugger sessions and
//! process output go through these traits so an editor, a terminal front-end
//! or a test can supply its own implementation.

use crate::debug::AttachConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Answer to "the management port of a running server changed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPortChoice {
    /// Write the launch-time port back into the configuration.
    Revert,
    /// Leave the file as edited.
    Ignore,
    /// Show why the change is a problem.
    MoreInfo,
}

/// Answer to "the http(s) port of a running server changed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartChoice {
    RestartNow,
    NotNow,
    /// Stop asking about http(s) port changes for the rest of the session and after.
    Never,
}

/// Yes/no questions asked before acting on a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// The server is idle and has to be started before browsing.
    StartBeforeBrowsing,
    /// The server is running and would be stopped and deleted.
    DeleteRunningServer,
}

/// User-facing choices.
///
/// Every method returns `None` when the user dismisses the question.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Picks one of several servers.
    async fn select_server(&self, names: &[String]) -> Option<String>;

    /// The management port of `server` no longer matches `launch_port`.
    async fn server_port_changed(&self, server: &str, launch_port: &str) -> Option<ServerPortChoice>;

    /// The http or https port of `server` changed while it runs.
    async fn config_changed(&self, server: &str) -> Option<RestartChoice>;

    /// Asks for the base URL context of `server`, e.g. `shop/cart`.
    async fn input_url_context(&self, server: &str) -> Option<String>;

    /// Yes/no question about `server`; anything but yes is `false`.
    async fn confirm(&self, server: &str, question: Confirmation) -> bool;

    /// Opens an external link.
    fn open_url(&self, url: &str);
}

/// Starts debugger sessions.
#[async_trait]
pub trait DebugLauncher: Send + Sync {
    async fn start_debugging(&self, config: &AttachConfig) -> Result<()>;
}

/// Receives the output lines of server processes.
pub trait OutputSink: Send + Sync {
    fn append_line(&self, server: &str, line: &str);
}

/// Re-emits process output as tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingOutput;

impl OutputSink for TracingOutput {
    fn append_line(&self, server: &str, line: &str) {
        tracing::info!(target: "wildfly_runner::output", server = %server, "{}", line);
    }
}

/// Prompter for unattended use: dismisses every question.
#[derive(Debug, Default, Clone, Copy)]
pub struct DismissAll;

#[async_trait]
impl Prompter for DismissAll {
    async fn select_server(&self, _names: &[String]) -> Option<String> {
        None
    }

    async fn server_port_changed(&self, server: &str, launch_port: &str) -> Option<ServerPortChoice> {
        tracing::warn!(
            server = %server,
            launch_port = %launch_port,
            "Management port changed on a running server; it may not shut down cleanly"
        );
        None
    }

    async fn config_changed(&self, server: &str) -> Option<RestartChoice> {
        tracing::warn!(server = %server, "HTTP(S) port changed on a running server; restart to apply");
        None
    }

    async fn input_url_context(&self, _server: &str) -> Option<String> {
        None
    }

    async fn confirm(&self, server: &str, question: Confirmation) -> bool {
        tracing::info!(server = %server, ?question, "Confirmation dismissed");
        false
    }

    fn open_url(&self, url: &str) {
        tracing::info!(%url, "Open in browser");
    }
}

/// Debug launcher that only logs the attach request.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDebugLauncher;

#[async_trait]
impl DebugLauncher for LogDebugLauncher {
    async fn start_debugging(&self, config: &AttachConfig) -> Result<()> {
        tracing::info!(
            session = %config.name,
            host = %config.host_name,
            port = config.port,
            "Debugger can attach"
        );
        Ok(())
    }
}

/// The collaborators a runner is built with.
#[derive(Clone)]
pub struct HostServices {
    pub prompter: Arc<dyn Prompter>,
    pub debugger: Arc<dyn DebugLauncher>,
    pub output: Arc<dyn OutputSink>,
}

impl HostServices {
    /// Collaborators for running without a user: questions are dismissed,
    /// output and attach requests are logged.
    pub fn headless() -> Self {
        Self {
            prompter: Arc::new(DismissAll),
            debugger: Arc::new(LogDebugLauncher),
            output: Arc::new(TracingOutput),
        }
    }

    pub fn with_prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    pub fn with_debugger(mut self, debugger: Arc<dyn DebugLauncher>) -> Self {
        self.debugger = debugger;
        self
    }

    pub fn with_output(mut self, output: Arc<dyn OutputSink>) -> Self {
        self.output = output;
        self
    }
}

impl Default for HostServices {
    fn default() -> Self {
        Self::headless()
    }
}
