//! What to do when the configuration of a running server changes.
//!
//! [`reconcile`] is the pure policy. [`Reconciler`] feeds it with change
//! messages from a [`ConfigWatcher`](crate::server::ConfigWatcher), one at a
//! time, and asks the [`Prompter`] when the policy calls for a choice.

use crate::config::{ports, PortKind, PortSnapshot};
use crate::error::Result;
use crate::host::{Prompter, RestartChoice, ServerPortChoice};
use crate::server::lifecycle::{Outcome, ServerLifecycleEvent, ServerLifecycleLog};
use crate::server::monitor::ConfigChange;
use crate::settings::SettingsService;
use crate::store::ServerStore;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Explains why changing the management port of a running server breaks shutdown.
pub const UNABLE_SHUTDOWN_URL: &str = "https://stackoverflow.com/questions/36566401/severe-could-not-contact-localhost8005-wildfly-may-not-be-running-error-while/48636631#48636631";

/// Decision of the reconciliation policy for one observed configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Nothing the runner cares about changed.
    Unchanged,
    /// The management port moved; the running server can no longer be shut
    /// down through it. Offer to revert, never restart.
    ServerPortChanged { launch_port: String, current_port: String },
    /// An http(s) port moved; a restart applies it.
    RestartAdvised,
    /// An http(s) port moved but the user asked never to be asked again.
    Suppressed,
}

/// Compares the launch-time ports with the current ones.
pub fn reconcile(baseline: &PortSnapshot, current: &PortSnapshot, restart_prompts_enabled: bool) -> Reconciliation {
    if baseline.server != current.server {
        return Reconciliation::ServerPortChanged {
            launch_port: baseline.server.clone(),
            current_port: current.server.clone(),
        };
    }
    if baseline.http != current.http || baseline.https != current.https {
        return if restart_prompts_enabled {
            Reconciliation::RestartAdvised
        } else {
            Reconciliation::Suppressed
        };
    }
    Reconciliation::Unchanged
}

/// At most one open prompt per launch.
#[derive(Debug, Clone, Default)]
pub struct PromptGuard {
    pending: Arc<AtomicBool>,
}

impl PromptGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the prompt slot; `false` if a prompt is already open.
    pub fn try_begin(&self) -> bool {
        self.pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn finish(&self) {
        self.pending.store(false, Ordering::Release);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

/// Restarts a server on behalf of the reconciliation loop.
#[async_trait]
pub trait Restarter: Send + Sync {
    async fn restart_instance(&self, instance_id: &str) -> Result<Outcome>;
}

/// Reconciliation state of one launch.
#[derive(Clone)]
pub struct Reconciler {
    instance_id: String,
    config_path: PathBuf,
    baseline: Arc<Mutex<PortSnapshot>>,
    guard: PromptGuard,
    store: ServerStore,
    settings: SettingsService,
    lifecycle: ServerLifecycleLog,
    prompter: Arc<dyn Prompter>,
    restarter: Arc<dyn Restarter>,
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instance_id: String,
        config_path: PathBuf,
        baseline: PortSnapshot,
        store: ServerStore,
        settings: SettingsService,
        lifecycle: ServerLifecycleLog,
        prompter: Arc<dyn Prompter>,
        restarter: Arc<dyn Restarter>,
    ) -> Self {
        Self {
            instance_id,
            config_path,
            baseline: Arc::new(Mutex::new(baseline)),
            guard: PromptGuard::new(),
            store,
            settings,
            lifecycle,
            prompter,
            restarter,
        }
    }

    pub fn guard(&self) -> &PromptGuard {
        &self.guard
    }

    /// Ports the running server was launched (or last reloaded) with.
    pub fn baseline(&self) -> Option<PortSnapshot> {
        self.baseline.lock().ok().map(|b| b.clone())
    }

    /// Replaces the comparison baseline, e.g. after an in-place reload.
    pub fn set_baseline(&self, snapshot: PortSnapshot) {
        if let Ok(mut baseline) = self.baseline.lock() {
            *baseline = snapshot;
        }
    }

    /// Consumes change messages until the stream ends or the task is aborted.
    pub async fn run(self, changes: impl Stream<Item = ConfigChange> + Send) {
        futures::pin_mut!(changes);
        while let Some(change) = changes.next().await {
            self.lifecycle.note(
                &self.instance_id,
                None,
                ServerLifecycleEvent::ConfigChanged,
                Some(change.path.display().to_string()),
            );
            if self.guard.is_pending() {
                tracing::debug!(instance = %self.instance_id, "Prompt already open, change ignored");
                continue;
            }
            self.handle_change().await;
        }
    }

    /// Applies the policy to the current file content.
    pub async fn handle_change(&self) -> Reconciliation {
        let current = match PortSnapshot::read(&self.config_path).await {
            Ok(current) => current,
            Err(e) => {
                tracing::warn!(
                    instance = %self.instance_id,
                    path = %self.config_path.display(),
                    error = %e,
                    "Cannot read changed configuration"
                );
                return Reconciliation::Unchanged;
            }
        };
        let Some(baseline) = self.baseline() else {
            return Reconciliation::Unchanged;
        };

        let decision = reconcile(&baseline, &current, self.settings.restart_prompts_enabled());
        tracing::debug!(instance = %self.instance_id, ?decision, "Configuration reconciled");

        match &decision {
            Reconciliation::ServerPortChanged { launch_port, .. } => {
                if self.guard.try_begin() {
                    let this = self.clone();
                    let launch_port = launch_port.clone();
                    tokio::spawn(async move {
                        this.resolve_server_port(&launch_port).await;
                        this.guard.finish();
                    });
                }
            }
            Reconciliation::RestartAdvised => {
                if self.guard.try_begin() {
                    let this = self.clone();
                    tokio::spawn(async move {
                        this.resolve_restart().await;
                        this.guard.finish();
                    });
                }
            }
            Reconciliation::Suppressed | Reconciliation::Unchanged => {}
        }
        decision
    }

    fn server_name(&self) -> String {
        match self.store.find_instance(&self.instance_id) {
            Ok(Some(record)) => record.name().to_string(),
            _ => self.instance_id.clone(),
        }
    }

    async fn resolve_server_port(&self, launch_port: &str) {
        let name = self.server_name();
        match self.prompter.server_port_changed(&name, launch_port).await {
            Some(ServerPortChoice::Revert) => {
                tracing::info!(server = %name, port = %launch_port, "Reverting management port");
                if let Err(e) = ports::set_port(&self.config_path, PortKind::Server, launch_port).await {
                    tracing::error!(server = %name, error = %e, "Failed to revert management port");
                }
            }
            Some(ServerPortChoice::MoreInfo) => self.prompter.open_url(UNABLE_SHUTDOWN_URL),
            Some(ServerPortChoice::Ignore) | None => {}
        }
    }

    async fn resolve_restart(&self) {
        let name = self.server_name();
        match self.prompter.config_changed(&name).await {
            Some(RestartChoice::RestartNow) => {
                if let Err(e) = self.restarter.restart_instance(&self.instance_id).await {
                    tracing::error!(server = %name, error = %e, "Restart after configuration change failed");
                }
            }
            Some(RestartChoice::Never) => {
                tracing::info!("Restart prompts for http(s) port changes disabled");
                if let Err(e) = self.settings.disable_restart_prompts().await {
                    tracing::warn!(error = %e, "Failed to persist settings");
                }
            }
            Some(RestartChoice::NotNow) | None => {}
        }
    }
}
