/*!
 # WildFly Runner

 A Rust library for provisioning, running and debugging local WildFly
 application server instances.

 ## Overview

 WildFly Runner provides functionality to:
 - Register a WildFly installation and keep a private writable copy per server
 - Start, stop, restart and reload servers through the vendor control scripts
 - Deploy `.war` packages and bind a debugger to a server
 - Watch the active configuration of a running server and react to port changes

 The hosting application is reached through the traits in [`host`]: choices go
 to a [`Prompter`](host::Prompter), debugger sessions to a
 [`DebugLauncher`](host::DebugLauncher) and process output to an
 [`OutputSink`](host::OutputSink).

 ## Basic Usage

 ```no_run
 use wildfly_runner::{WildflyRunner, Result};
 use std::path::Path;

 #[tokio::main]
 async fn main() -> Result<()> {
     // Create a runner from config file
     let runner = WildflyRunner::from_config_file("wildfly-runner.yaml")?;

     // Register an installation
     let server = runner.add_server(Path::new("/opt/wildfly-30.0.1.Final")).await?;

     // Deploy and run a package
     runner
         .run_on_server(Path::new("target/app.war"), false, Some(server.name()), &[])
         .await?;

     // Stop everything before exiting
     runner.shutdown().await?;
     Ok(())
 }
 ```

 ## Features

 - **Server Management**: Start, stop, restart and monitor WildFly servers
 - **Configuration Reconciliation**: React to port changes of running servers
 - **Deployment**: Single-artifact deployment with optional debugger attach
 - **Configuration**: Configure the runner through JSON or YAML files
 - **Async Support**: Full async/await support

 ## License

 This project is licensed under the terms in the LICENSE file.
*/

pub mod config;
pub mod debug;
pub mod deploy;
pub mod error;
pub mod host;
pub mod install;
pub mod server;
pub mod settings;
pub mod store;

pub use config::{RestartMode, RunnerConfig};
pub use error::{Error, Result};
pub use host::HostServices;
pub use server::{Outcome, ServerRecord, ServerState};
pub use settings::SettingsService;
pub use store::ServerStore;

use async_trait::async_trait;
use config::{options, ports, PortKind, PortSnapshot};
use deploy::{Archiver, JarArchiver};
use install::{CopyProvisioner, Provisioner};
use host::Confirmation;
use server::{
    ConfigWatcher, ControlCommand, ControlScript, LaunchId, Reconciler, Restarter, ServerLifecycleEvent,
    ServerLifecycleLog, ServerProcess, WatchHandle,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How often `wait_for_state` looks at a record.
const STATE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Background state of one live launch.
struct Runtime {
    launch: LaunchId,
    config_path: PathBuf,
    reconciler: Reconciler,
    _watcher: WatchHandle,
}

/// What a stop or restart request sends to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Request {
    Stop,
    Restart(ControlCommand),
}

impl Request {
    fn command(self) -> ControlCommand {
        match self {
            Request::Stop => ControlCommand::Shutdown,
            Request::Restart(command) => command,
        }
    }
}

/// What follows a reload command that returned.
enum AfterReload {
    Reloaded,
    Shutdown(ServerRecord),
    Exited,
}

/// Manage local WildFly servers
///
/// This struct is the main entry point: it owns the server list, the user
/// preferences and the background tasks of every running server. It is cheap
/// to clone; clones share all state.
/// All public methods are instrumented with `tracing` spans.
#[derive(Clone)]
pub struct WildflyRunner {
    /// Configuration
    config: Arc<RunnerConfig>,
    /// Registered servers
    store: ServerStore,
    /// User preferences
    settings: SettingsService,
    /// Lifecycle history
    lifecycle: ServerLifecycleLog,
    /// Hosting application
    host: HostServices,
    /// Creates server copies
    provisioner: Arc<dyn Provisioner>,
    /// Packages folders; `None` means the JDK `jar` tool
    archiver: Option<Arc<dyn Archiver>>,
    /// Live launches keyed by instance id
    runtimes: Arc<Mutex<HashMap<String, Runtime>>>,
}

impl WildflyRunner {
    /// Create a new runner from a configuration file path
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(path), fields(config_path = ?path.as_ref()))]
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        tracing::info!("Loading configuration from file");
        let config = RunnerConfig::from_file(path)?;
        Self::new(config)
    }

    /// Create a new runner from a configuration
    ///
    /// Loads the server list and the preferences from the storage root. A
    /// missing or corrupt file starts empty.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(config), fields(storage_root = %config.storage_root.display()))]
    pub fn new(config: RunnerConfig) -> Result<Self> {
        config::validate_config(&config)?;
        tracing::info!("Creating new WildflyRunner");
        let store = ServerStore::load(config.servers_file());
        let settings = SettingsService::load(config.settings_file());
        Ok(Self {
            config: Arc::new(config),
            store,
            settings,
            lifecycle: ServerLifecycleLog::new(),
            host: HostServices::headless(),
            provisioner: Arc::new(CopyProvisioner),
            archiver: None,
            runtimes: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Replaces the hosting application collaborators.
    pub fn with_host_services(mut self, host: HostServices) -> Self {
        self.host = host;
        self
    }

    pub fn with_provisioner(mut self, provisioner: Arc<dyn Provisioner>) -> Self {
        self.provisioner = provisioner;
        self
    }

    pub fn with_archiver(mut self, archiver: Arc<dyn Archiver>) -> Self {
        self.archiver = Some(archiver);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn store(&self) -> &ServerStore {
        &self.store
    }

    pub fn settings(&self) -> &SettingsService {
        &self.settings
    }

    pub fn lifecycle(&self) -> &ServerLifecycleLog {
        &self.lifecycle
    }

    /// Snapshot of all registered servers.
    pub fn list_servers(&self) -> Result<Vec<ServerRecord>> {
        self.store.list()
    }

    /// Current record of the server named `name`.
    pub fn find(&self, name: &str) -> Result<ServerRecord> {
        self.store
            .find(name)?
            .ok_or_else(|| Error::ServerNotFound(name.to_string()))
    }

    /// Resolves an optional server name to a record.
    ///
    /// Without a name the only server is picked, or the user is asked when
    /// there are several. `None` means the user dismissed the choice.
    async fn select(&self, name: Option<&str>) -> Result<Option<ServerRecord>> {
        if self.store.is_empty()? {
            tracing::debug!("No server registered");
            return Err(Error::NoServer);
        }
        if let Some(name) = name {
            return self.find(name).map(Some);
        }

        let mut names = self.store.names()?;
        let picked = if names.len() == 1 {
            names.pop()
        } else {
            self.host.prompter.select_server(&names).await
        };
        match picked {
            Some(name) => self.find(&name).map(Some),
            None => Ok(None),
        }
    }

    fn record_of(&self, instance_id: &str) -> Result<ServerRecord> {
        self.store
            .find_instance(instance_id)?
            .ok_or_else(|| Error::ServerNotFound(instance_id.to_string()))
    }

    /// Registers a copy of the installation at `install_path`.
    ///
    /// The server is named after the installation directory, with a `-N`
    /// suffix when that name is taken.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(install_path = %install_path.display()))]
    pub async fn add_server(&self, install_path: &Path) -> Result<ServerRecord> {
        config::validator::validate_install_path(install_path).await?;

        let (name, storage_path) = install::allocate(install_path, &self.store.names()?, &self.config.servers_dir());
        tracing::info!(server_name = %name, storage = %storage_path.display(), "Provisioning server copy");

        if let Err(e) = self.provisioner.provision(install_path, &storage_path).await {
            tracing::error!(error = %e, "Failed to provision server copy");
            if let Err(cleanup) = tokio::fs::remove_dir_all(&storage_path).await {
                tracing::debug!(error = %cleanup, "Nothing to clean up after failed provisioning");
            }
            return Err(e);
        }

        let record = ServerRecord::new(name, install_path, storage_path);
        self.store.add(record.clone()).await?;
        tracing::info!(server_name = %record.name(), "Server added");
        Ok(record)
    }

    /// Stops the server if it runs, then removes it and its storage.
    ///
    /// Returns the removed record, or `None` if the user dismissed the choice.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_name = ?name))]
    pub async fn delete_server(&self, name: Option<&str>) -> Result<Option<ServerRecord>> {
        let Some(record) = self.select(name).await? else {
            return Ok(None);
        };
        let id = record.instance_id();

        if record.state() != ServerState::Idle {
            if !self
                .host
                .prompter
                .confirm(record.name(), Confirmation::DeleteRunningServer)
                .await
            {
                tracing::info!(server_name = %record.name(), "Deletion of running server declined");
                return Ok(None);
            }

            // A launch in progress has to finish before it can be stopped.
            let timeout = self.config.stop_timeout();
            let state = self
                .wait_until(&id, timeout, |state| state != ServerState::Starting)
                .await?;
            if state != ServerState::Idle {
                tracing::info!(server_name = %record.name(), "Stopping server before deletion");
                match self.control(&id, Request::Stop).await {
                    Ok(outcome) => tracing::debug!(?outcome, "Stop requested"),
                    Err(e) => tracing::warn!(error = %e, "Stop before deletion failed"),
                }
                self.wait_for_instance(&id, ServerState::Idle, timeout).await?;
            }
        }

        self.detach(&id, None);
        self.store.remove(record.name()).await?;
        Ok(Some(record))
    }

    /// Renames a server; the new name is persisted when this returns.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_name = %name))]
    pub async fn rename_server(&self, name: &str, new_name: &str) -> Result<()> {
        self.store.rename(name, new_name).await
    }

    /// Start a server
    ///
    /// Returns once the control script is launched; the process lifetime is
    /// awaited in the background.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_name = ?name))]
    pub async fn start_server(&self, name: Option<&str>) -> Result<Outcome> {
        let Some(record) = self.select(name).await? else {
            return Ok(Outcome::Cancelled);
        };
        self.start_instance(&record.instance_id()).await
    }

    /// Stop a running server
    ///
    /// Returns once the shutdown command completed; the server settles at
    /// [`ServerState::Idle`] when its process exits.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_name = ?name))]
    pub async fn stop_server(&self, name: Option<&str>) -> Result<Outcome> {
        let Some(record) = self.select(name).await? else {
            return Ok(Outcome::Cancelled);
        };
        self.control(&record.instance_id(), Request::Stop).await
    }

    /// Restart a running server
    ///
    /// Depending on [`RestartMode`] the server reloads in place or is shut
    /// down and relaunched. Restarts requested while a stop is in flight
    /// coalesce into a single relaunch.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_name = ?name))]
    pub async fn restart_server(&self, name: Option<&str>) -> Result<Outcome> {
        let Some(record) = self.select(name).await? else {
            return Ok(Outcome::Cancelled);
        };
        self.control(&record.instance_id(), Request::Restart(self.restart_command()))
            .await
    }

    fn restart_command(&self) -> ControlCommand {
        match self.config.restart_mode {
            RestartMode::Reload => ControlCommand::Reload,
            RestartMode::Relaunch => ControlCommand::Shutdown,
        }
    }

    async fn start_instance(&self, instance_id: &str) -> Result<Outcome> {
        let record = self.record_of(instance_id)?;
        if record.state() != ServerState::Idle {
            tracing::info!(server_name = %record.name(), state = %record.state(), "Server already running");
            return Ok(Outcome::AlreadyRunning);
        }

        let process = self.spawn_process(instance_id).await?;
        tokio::spawn(self.clone().supervise(instance_id.to_string(), process));
        Ok(Outcome::Started)
    }

    /// Launches the control script of an instance and attaches its watcher.
    ///
    /// On failure the instance is left idle without watcher or debug binding.
    async fn spawn_process(&self, instance_id: &str) -> Result<ServerProcess> {
        let record = self.store.update_instance(instance_id, |r| {
            r.state = ServerState::Starting;
            r.clone()
        })?;

        match self.try_spawn(&record).await {
            Ok(process) => Ok(process),
            Err(e) => {
                tracing::error!(server_name = %record.name(), error = %e, "Failed to start server");
                self.detach(instance_id, None);
                let settled = self.store.update_instance(instance_id, |r| {
                    r.state = ServerState::Idle;
                    r.clear_requests();
                    debug::unbind(r);
                });
                if let Err(settle) = settled {
                    tracing::warn!(error = %settle, "Server vanished during failed start");
                }
                self.lifecycle.note(
                    instance_id,
                    None,
                    ServerLifecycleEvent::Failed,
                    Some(e.to_string()),
                );
                self.host.output.append_line(record.name(), &e.to_string());
                Err(e)
            }
        }
    }

    async fn try_spawn(&self, record: &ServerRecord) -> Result<ServerProcess> {
        let instance_id = record.instance_id();
        let storage = record.storage_path();

        let jvm_options = options::read_jvm_options(storage).await?;
        let config_path = options::configuration_dir(storage).join(options::server_config_name(&jvm_options));
        let content = match tokio::fs::read(&config_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ConfigNotFound(config_path));
            }
            Err(e) => return Err(e.into()),
        };
        let baseline = PortSnapshot::from_xml(&String::from_utf8_lossy(&content))?;
        tracing::debug!(?baseline, "Ports at launch");

        let mut args = jvm_options.clone();
        if let Some(binding) = record.debugging() {
            args.push("--debug".to_string());
            args.push(binding.port.to_string());
        }

        let process = ControlScript::standalone(storage).launch(record.name(), &args, Arc::clone(&self.host.output))?;
        let launch = process.id();

        self.store.update_instance(&instance_id, |r| {
            r.state = ServerState::Running;
            r.jvm_options = jvm_options;
        })?;
        self.lifecycle.note(
            &instance_id,
            Some(launch),
            ServerLifecycleEvent::Started,
            Some(format!("pid {}", process.pid())),
        );
        tracing::info!(server_name = %record.name(), %launch, pid = process.pid(), "Server started");

        self.attach(&instance_id, launch, config_path, baseline, content);
        if let Some(attach) = debug::attach_config(record) {
            self.schedule_debugger(instance_id, attach);
        }
        Ok(process)
    }

    /// Starts the watcher and reconciliation loop of a launch.
    fn attach(&self, instance_id: &str, launch: LaunchId, config_path: PathBuf, baseline: PortSnapshot, content: Vec<u8>) {
        let reconciler = Reconciler::new(
            instance_id.to_string(),
            config_path.clone(),
            baseline,
            self.store.clone(),
            self.settings.clone(),
            self.lifecycle.clone(),
            Arc::clone(&self.host.prompter),
            Arc::new(self.clone()),
        );
        let changes = ConfigWatcher::new(config_path.clone(), self.config.watch_interval(), Some(content)).changes();
        let task = tokio::spawn(reconciler.clone().run(changes));

        let runtime = Runtime {
            launch,
            config_path,
            reconciler,
            _watcher: WatchHandle::new(task),
        };
        let previous = match self.runtimes.lock() {
            Ok(mut runtimes) => runtimes.insert(instance_id.to_string(), runtime),
            Err(_) => {
                tracing::error!("Failed to lock runtimes; configuration is not watched");
                None
            }
        };
        drop(previous);
    }

    /// Tears down the watcher of an instance, if it belongs to `launch`.
    fn detach(&self, instance_id: &str, launch: Option<LaunchId>) {
        let removed = match self.runtimes.lock() {
            Ok(mut runtimes) => {
                let matches = runtimes
                    .get(instance_id)
                    .is_some_and(|runtime| launch.is_none_or(|launch| runtime.launch == launch));
                if matches { runtimes.remove(instance_id) } else { None }
            }
            Err(_) => None,
        };
        if removed.is_some() {
            tracing::debug!(instance = %instance_id, "Configuration watcher stopped");
        }
    }

    fn runtime_state(&self, instance_id: &str) -> Option<(LaunchId, PathBuf, Reconciler)> {
        let runtimes = self.runtimes.lock().ok()?;
        runtimes
            .get(instance_id)
            .map(|runtime| (runtime.launch, runtime.config_path.clone(), runtime.reconciler.clone()))
    }

    /// Whether the configuration of an instance is being watched.
    pub fn is_watching(&self, name: &str) -> Result<bool> {
        let id = self.find(name)?.instance_id();
        Ok(self.runtime_state(&id).is_some())
    }

    fn schedule_debugger(&self, instance_id: String, attach: debug::AttachConfig) {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.config.attach_delay()).await;
            let still_bound = this
                .store
                .find_instance(&instance_id)
                .ok()
                .flatten()
                .is_some_and(|r| r.is_started() && r.is_debugging());
            if !still_bound {
                tracing::debug!(instance = %instance_id, "Debug binding gone before attach");
                return;
            }
            if let Err(e) = this.host.debugger.start_debugging(&attach).await {
                tracing::warn!(session = %attach.name, error = %e, "Failed to start debug session");
            }
        });
    }

    /// Awaits the process of an instance and relaunches it while a restart is pending.
    async fn supervise(self, instance_id: String, mut process: ServerProcess) {
        loop {
            let status = process.wait().await;
            if !self.settle_exit(&instance_id, process.id(), status) {
                break;
            }
            match self.spawn_process(&instance_id).await {
                Ok(next) => process = next,
                Err(_) => break,
            }
        }
    }

    /// Settles an instance after its process exited. Returns whether to relaunch.
    fn settle_exit(
        &self,
        instance_id: &str,
        launch: LaunchId,
        status: Result<async_process::ExitStatus>,
    ) -> bool {
        self.detach(instance_id, Some(launch));

        let details = match &status {
            Ok(status) => status.to_string(),
            Err(e) => e.to_string(),
        };
        let relaunch = self.store.update_instance(instance_id, |r| {
            let relaunch = r.pending_restart;
            r.clear_requests();
            r.state = if relaunch { ServerState::Starting } else { ServerState::Idle };
            if !relaunch {
                debug::unbind(r);
            }
            relaunch
        });
        let relaunch = match relaunch {
            Ok(relaunch) => relaunch,
            Err(e) => {
                tracing::debug!(instance = %instance_id, error = %e, "Exited server is no longer registered");
                false
            }
        };

        match &status {
            Ok(exit) if exit.success() => tracing::info!(instance = %instance_id, %launch, "Server exited"),
            _ => {
                tracing::warn!(instance = %instance_id, %launch, status = %details, "Server exited abnormally");
                let server = self
                    .store
                    .find_instance(instance_id)
                    .ok()
                    .flatten()
                    .map(|r| r.name().to_string())
                    .unwrap_or_else(|| instance_id.to_string());
                self.host
                    .output
                    .append_line(&server, &format!("Server exited unexpectedly: {}", details));
            }
        }
        self.lifecycle.note(instance_id, Some(launch), ServerLifecycleEvent::Stopped, Some(details));
        if relaunch {
            self.lifecycle.note(instance_id, Some(launch), ServerLifecycleEvent::Restarted, None);
        }
        relaunch
    }

    /// Sends a shutdown or reload command to a running instance.
    ///
    /// While a reload is in flight the process stays alive, so a stop or a
    /// relaunch arriving meanwhile is queued and sent once the reload returns.
    async fn control(&self, instance_id: &str, request: Request) -> Result<Outcome> {
        let decision = self.store.update_instance(instance_id, |r| {
            let reloading = r.in_flight == Some(ControlCommand::Reload);
            match (r.state, request) {
                (ServerState::Idle | ServerState::Starting, _) => Err(Outcome::AlreadyStopped),
                (ServerState::Stopping, Request::Restart(command)) => {
                    r.pending_restart = true;
                    if reloading && command == ControlCommand::Shutdown {
                        r.shutdown_queued = true;
                    }
                    Err(Outcome::RestartCoalesced)
                }
                (ServerState::Stopping, Request::Stop) => {
                    r.pending_restart = false;
                    debug::unbind(r);
                    if reloading {
                        r.shutdown_queued = true;
                    }
                    Err(Outcome::StopInProgress)
                }
                (ServerState::Running, _) => {
                    let restart = matches!(request, Request::Restart(_));
                    r.state = ServerState::Stopping;
                    r.pending_restart = restart;
                    r.in_flight = Some(request.command());
                    if !restart {
                        debug::unbind(r);
                    }
                    Ok(r.clone())
                }
            }
        })?;
        let record = match decision {
            Ok(record) => record,
            Err(advisory) => {
                tracing::info!(instance = %instance_id, ?advisory, "Nothing to send");
                return Ok(advisory);
            }
        };

        self.send(instance_id, &record, request.command()).await?;
        match request {
            Request::Stop => Ok(Outcome::Stopping),
            Request::Restart(ControlCommand::Reload) => self.finish_reload(instance_id).await,
            Request::Restart(ControlCommand::Shutdown) => Ok(Outcome::Restarting),
        }
    }

    /// Runs a management command to completion.
    ///
    /// On failure the process never received the command and keeps running.
    async fn send(&self, instance_id: &str, record: &ServerRecord, command: ControlCommand) -> Result<()> {
        let args: Vec<String> = command.args().iter().map(|arg| arg.to_string()).collect();
        tracing::info!(server_name = %record.name(), ?command, "Sending management command");

        let sent = ControlScript::cli(record.storage_path())
            .run(record.name(), &args, Arc::clone(&self.host.output))
            .await;
        let Err(e) = sent else {
            return Ok(());
        };

        tracing::error!(server_name = %record.name(), error = %e, "Management command failed");
        if let Err(settle) = self.store.update_instance(instance_id, |r| {
            if r.state == ServerState::Stopping {
                r.state = ServerState::Running;
            }
            r.clear_requests();
        }) {
            tracing::warn!(error = %settle, "Server vanished during failed command");
        }
        let launch = self.runtime_state(instance_id).map(|(launch, _, _)| launch);
        self.lifecycle
            .note(instance_id, launch, ServerLifecycleEvent::Failed, Some(e.to_string()));
        self.host.output.append_line(record.name(), &e.to_string());
        Err(e)
    }

    /// Completes a reload command that returned.
    ///
    /// A stop or relaunch queued during the reload is sent now.
    async fn finish_reload(&self, instance_id: &str) -> Result<Outcome> {
        let next = self
            .store
            .update_instance(instance_id, |r| {
                if r.state != ServerState::Stopping || r.in_flight != Some(ControlCommand::Reload) {
                    return AfterReload::Exited;
                }
                if r.shutdown_queued {
                    r.shutdown_queued = false;
                    r.in_flight = Some(ControlCommand::Shutdown);
                    return AfterReload::Shutdown(r.clone());
                }
                r.state = ServerState::Running;
                r.clear_requests();
                AfterReload::Reloaded
            })
            .unwrap_or(AfterReload::Exited);

        match next {
            // The process exited; the supervisor settles or relaunches it.
            AfterReload::Exited => Ok(Outcome::Restarting),
            AfterReload::Shutdown(record) => {
                tracing::info!(server_name = %record.name(), "Sending shutdown queued during reload");
                self.send(instance_id, &record, ControlCommand::Shutdown).await?;
                if record.pending_restart() {
                    Ok(Outcome::Restarting)
                } else {
                    Ok(Outcome::Stopping)
                }
            }
            AfterReload::Reloaded => {
                if let Some((launch, config_path, reconciler)) = self.runtime_state(instance_id) {
                    match PortSnapshot::read(&config_path).await {
                        Ok(snapshot) => reconciler.set_baseline(snapshot),
                        Err(e) => tracing::warn!(error = %e, "Keeping previous port baseline after reload"),
                    }
                    self.lifecycle
                        .note(instance_id, Some(launch), ServerLifecycleEvent::Reloaded, None);
                }
                tracing::info!(instance = %instance_id, "Server reloaded");
                Ok(Outcome::Reloaded)
            }
        }
    }

    /// Waits until the server named `name` reaches `state`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Process`] when `timeout` elapses first.
    pub async fn wait_for_state(&self, name: &str, state: ServerState, timeout: Duration) -> Result<()> {
        let id = self.find(name)?.instance_id();
        self.wait_for_instance(&id, state, timeout).await
    }

    async fn wait_for_instance(&self, instance_id: &str, state: ServerState, timeout: Duration) -> Result<()> {
        self.wait_until(instance_id, timeout, |current| current == state)
            .await
            .map(|_| ())
            .map_err(|e| match e {
                Error::Process(_) => Error::Process(format!(
                    "Timed out waiting for server {} to become {}",
                    instance_id, state
                )),
                other => other,
            })
    }

    /// Polls an instance until its state satisfies `reached`; returns that state.
    async fn wait_until(
        &self,
        instance_id: &str,
        timeout: Duration,
        reached: impl Fn(ServerState) -> bool,
    ) -> Result<ServerState> {
        let polled = tokio::time::timeout(timeout, async {
            loop {
                match self.store.find_instance(instance_id) {
                    Ok(Some(record)) if reached(record.state()) => return Ok(record.state()),
                    Ok(Some(_)) => {}
                    Ok(None) => return Err(Error::ServerNotFound(instance_id.to_string())),
                    Err(e) => return Err(e),
                }
                tokio::time::sleep(STATE_POLL_INTERVAL).await;
            }
        })
        .await;

        polled.unwrap_or_else(|_| {
            Err(Error::Process(format!(
                "Timed out waiting for server {}",
                instance_id
            )))
        })
    }

    /// Deploys `artifact` to a server and makes sure it runs in the requested mode.
    ///
    /// A server already running in the requested mode picks the package up by
    /// itself. Otherwise the debug binding is updated and the server is
    /// started, or relaunched so the debug agent setting applies.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self, workspace_folders), fields(artifact = %artifact.display(), server_name = ?server))]
    pub async fn run_on_server(
        &self,
        artifact: &Path,
        debug_mode: bool,
        server: Option<&str>,
        workspace_folders: &[PathBuf],
    ) -> Result<Outcome> {
        deploy::validate_webapp(artifact).await?;
        let workspace = if debug_mode {
            let folder = debug::resolve_workspace(workspace_folders, artifact).ok_or_else(|| {
                Error::InvalidArtifact("The artifact is not inside an open workspace folder.".to_string())
            })?;
            Some(folder)
        } else {
            None
        };

        let Some(record) = self.select(server).await? else {
            return Ok(Outcome::Cancelled);
        };
        deploy::deploy_war(&record.deployments_dir(), artifact).await?;

        let id = record.instance_id();
        if record.is_started() && record.is_debugging() == debug_mode {
            tracing::info!("Deployed to running server");
            return Ok(Outcome::Deployed);
        }

        let port = self.config.default_debug_port;
        self.store.update_instance(&id, |r| match workspace {
            Some(folder) => debug::bind(r, port, folder),
            None => debug::unbind(r),
        })?;

        if record.is_started() {
            self.control(&id, Request::Restart(ControlCommand::Shutdown)).await
        } else {
            self.start_instance(&id).await
        }
    }

    /// Root URL of a server: `http://0.0.0.0:<http port>/`.
    async fn http_root(&self, record: &ServerRecord) -> Result<String> {
        let config_path = options::server_config_path(record.storage_path()).await?;
        let raw = ports::get_port(&config_path, PortKind::Http).await?;
        let port = ports::effective_port(&raw)
            .ok_or_else(|| Error::ConfigParse(format!("Cannot resolve http port '{}'", raw)))?;
        Ok(format!("http://0.0.0.0:{}/", port))
    }

    /// The browse URL of a server: its http port plus the base URL context.
    pub async fn browse_url(&self, name: &str) -> Result<String> {
        let record = self.find(name)?;
        let root = self.http_root(&record).await?;
        Ok(root + record.base_url_context().unwrap_or_default())
    }

    /// The URL of a deployed package, served under its file stem.
    pub async fn deployment_url(&self, name: &str, package: &str) -> Result<String> {
        let record = self.find(name)?;
        let stem = Path::new(package)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidArtifact(format!("'{}' is not a package name", package)))?;
        let root = self.http_root(&record).await?;
        Ok(root + &stem)
    }

    /// Opens the browse URL of a server.
    ///
    /// An idle server is started once the user agrees; declining cancels.
    /// Without a base URL context the user is asked for one first, and a
    /// dismissed question stores an empty context.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_name = ?name))]
    pub async fn browse_server(&self, name: Option<&str>) -> Result<Outcome> {
        let Some(record) = self.select(name).await? else {
            return Ok(Outcome::Cancelled);
        };
        let outcome = if record.is_started() {
            Outcome::AlreadyRunning
        } else if self
            .host
            .prompter
            .confirm(record.name(), Confirmation::StartBeforeBrowsing)
            .await
        {
            self.start_instance(&record.instance_id()).await?
        } else {
            return Ok(Outcome::Cancelled);
        };

        if record.base_url_context().is_none() {
            let answer = self.host.prompter.input_url_context(record.name()).await;
            self.set_base_url_context(record.name(), answer.as_deref().unwrap_or_default())?;
        }
        let url = self.browse_url(record.name()).await?;
        self.host.prompter.open_url(&url);
        Ok(outcome)
    }

    /// Opens the URL of a deployed package.
    ///
    /// An idle server is started if the user agrees; the URL opens either way.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_name = %name))]
    pub async fn browse_deployment(&self, name: &str, package: &str) -> Result<Outcome> {
        let record = self.find(name)?;
        let file = deploy::package_file_name(package)?;
        let deployed = deploy::list_deployments(&record.deployments_dir()).await?;
        if !deployed.iter().any(|path| path.file_name() == Some(file.as_os_str())) {
            return Err(Error::InvalidArtifact(format!(
                "{} is not deployed to {}",
                file.display(),
                name
            )));
        }

        let outcome = if record.is_started() {
            Outcome::AlreadyRunning
        } else if self
            .host
            .prompter
            .confirm(record.name(), Confirmation::StartBeforeBrowsing)
            .await
        {
            self.start_instance(&record.instance_id()).await?
        } else {
            Outcome::AlreadyStopped
        };

        let url = self.deployment_url(name, package).await?;
        self.host.prompter.open_url(&url);
        Ok(outcome)
    }

    /// Sets the path appended to browse URLs of a server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrlContext`] for text spanning several
    /// lines or containing whitespace.
    pub fn set_base_url_context(&self, name: &str, context: &str) -> Result<()> {
        let context = config::validator::validate_url_context(context)?;
        self.store.update(name, |r| r.base_url_context = Some(context))
    }

    /// Path of the active configuration file of a server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigNotFound`] when the file does not exist.
    pub async fn server_config_file(&self, name: &str) -> Result<PathBuf> {
        let record = self.find(name)?;
        let path = options::server_config_path(record.storage_path()).await?;
        if tokio::fs::try_exists(&path).await? {
            Ok(path)
        } else {
            Err(Error::ConfigNotFound(path))
        }
    }

    /// Path of the `jvm.options` file of a server, created with defaults if missing.
    pub async fn customize_jvm_options(&self, name: &str) -> Result<PathBuf> {
        let record = self.find(name)?;
        options::ensure_jvm_option_file(record.storage_path()).await
    }

    pub async fn list_deployments(&self, name: &str) -> Result<Vec<PathBuf>> {
        let record = self.find(name)?;
        deploy::list_deployments(&record.deployments_dir()).await
    }

    /// Removes a deployed package; `false` if it was not deployed.
    #[tracing::instrument(skip(self), fields(server_name = %name))]
    pub async fn delete_deployment(&self, name: &str, package: &str) -> Result<bool> {
        let record = self.find(name)?;
        deploy::delete_deployment(&record.deployments_dir(), package).await
    }

    /// Packages each folder into `<folder>/<folder name>.war`.
    #[tracing::instrument(skip(self, folders), fields(num_folders = folders.len()))]
    pub async fn package_folders(&self, folders: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let archiver: Arc<dyn Archiver> = match &self.archiver {
            Some(archiver) => Arc::clone(archiver),
            None => Arc::new(JarArchiver::new(Arc::clone(&self.host.output))),
        };
        let jobs = folders.iter().map(|folder| {
            let archiver = Arc::clone(&archiver);
            async move {
                let label = folder
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .ok_or_else(|| Error::InvalidArtifact(format!("{} has no name", folder.display())))?;
                archiver.package(folder, &label).await
            }
        });
        let packages = futures::future::try_join_all(jobs).await?;
        tracing::info!(num_packages = packages.len(), "Packages generated");
        Ok(packages)
    }

    /// Unbinds the server whose debug session ended.
    ///
    /// Returns whether the session belonged to a server.
    pub fn on_debug_session_terminated(&self, session_name: &str) -> bool {
        let Some(instance_id) = debug::session_instance(session_name) else {
            return false;
        };
        match self.store.update_instance(instance_id, debug::unbind) {
            Ok(()) => {
                tracing::info!(instance = %instance_id, "Debug session ended");
                true
            }
            Err(_) => false,
        }
    }

    /// Stops every running server and writes the server list synchronously.
    ///
    /// Individual stop failures are logged and do not stop the others.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down WildflyRunner");
        for record in self.store.list()? {
            if !record.is_started() {
                continue;
            }
            if let Err(e) = self.control(&record.instance_id(), Request::Stop).await {
                tracing::warn!(server_name = %record.name(), error = %e, "Failed to stop server during shutdown");
            }
        }

        let runtimes = match self.runtimes.lock() {
            Ok(mut runtimes) => std::mem::take(&mut *runtimes),
            Err(_) => HashMap::new(),
        };
        drop(runtimes);

        self.store.persist_sync()
    }
}

#[async_trait]
impl Restarter for WildflyRunner {
    async fn restart_instance(&self, instance_id: &str) -> Result<Outcome> {
        self.control(instance_id, Request::Restart(self.restart_command()))
            .await
    }
}
