// src/server/process.rs
use crate::error::{Error, Result};
use crate::host::OutputSink;
use async_process::{Child, Command, ExitStatus, Stdio};
use futures_lite::io::{AsyncBufReadExt, AsyncRead, BufReader};
use futures_lite::StreamExt;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier of one launched server process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaunchId(Uuid);

impl LaunchId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LaunchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Management command sent through the CLI script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Shutdown,
    Reload,
}

impl ControlCommand {
    /// Arguments passed to `jboss-cli`.
    pub fn args(self) -> [&'static str; 2] {
        match self {
            ControlCommand::Shutdown => ["--connect", "command=:shutdown"],
            ControlCommand::Reload => ["--connect", "command=:reload"],
        }
    }
}

/// Script extension of the current platform.
pub fn script_extension() -> &'static str {
    if cfg!(windows) { "bat" } else { "sh" }
}

/// A vendor control script inside a server copy.
#[derive(Debug, Clone)]
pub struct ControlScript {
    path: PathBuf,
}

impl ControlScript {
    /// `bin/standalone` of the server stored at `storage_path`.
    pub fn standalone(storage_path: &Path) -> Self {
        Self::in_bin(storage_path, "standalone")
    }

    /// `bin/jboss-cli` of the server stored at `storage_path`.
    pub fn cli(storage_path: &Path) -> Self {
        Self::in_bin(storage_path, "jboss-cli")
    }

    fn in_bin(storage_path: &Path, stem: &str) -> Self {
        Self {
            path: storage_path
                .join("bin")
                .join(format!("{}.{}", stem, script_extension())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn command(&self, args: &[String]) -> Command {
        let mut command = if cfg!(windows) {
            let mut command = Command::new("cmd");
            command.arg("/C").arg(&self.path);
            command
        } else {
            Command::new(&self.path)
        };
        command.args(args);
        if let Some(bin) = self.path.parent() {
            command.current_dir(bin);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    /// Launches the script without waiting for it to exit.
    pub fn launch(&self, server_name: &str, args: &[String], output: Arc<dyn OutputSink>) -> Result<ServerProcess> {
        tracing::debug!(script = %self.path.display(), ?args, "Launching control script");
        let mut child = self
            .command(args)
            .spawn()
            .map_err(|e| Error::Process(format!("Failed to start {}: {}", self.path.display(), e)))?;

        forward_output(&mut child, server_name, output);

        Ok(ServerProcess {
            id: LaunchId::new(),
            pid: child.id(),
            child,
        })
    }

    /// Runs the script to completion, failing on a non-zero exit status.
    pub async fn run(&self, server_name: &str, args: &[String], output: Arc<dyn OutputSink>) -> Result<()> {
        let mut process = self.launch(server_name, args, output)?;
        let status = process.wait().await?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::Process(format!(
                "{} exited with {}",
                self.path.display(),
                status
            )))
        }
    }
}

/// A launched control script
pub struct ServerProcess {
    id: LaunchId,
    pid: u32,
    child: Child,
}

impl ServerProcess {
    pub fn id(&self) -> LaunchId {
        self.id
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Waits for the process to exit.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        self.child
            .status()
            .await
            .map_err(|e| Error::Process(format!("Failed to wait for process {}: {}", self.pid, e)))
    }
}

impl fmt::Debug for ServerProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerProcess")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .finish()
    }
}

fn forward_output(child: &mut Child, server_name: &str, output: Arc<dyn OutputSink>) {
    if let Some(stdout) = child.stdout.take() {
        spawn_line_reader(stdout, server_name.to_string(), Arc::clone(&output));
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_line_reader(stderr, server_name.to_string(), output);
    }
}

fn spawn_line_reader<R>(pipe: R, server_name: String, output: Arc<dyn OutputSink>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        while let Some(line) = lines.next().await {
            match line {
                Ok(line) => output.append_line(&server_name, &line),
                Err(e) => {
                    tracing::debug!(server = %server_name, error = %e, "Output pipe closed");
                    break;
                }
            }
        }
    });
}
