use crate::error::{Error, Result};
use crate::server::LaunchId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Maximum number of events kept in the history.
const MAX_EVENTS: usize = 1000;

/// Result of a lifecycle request that did not fail.
///
/// Only `Started`, `Stopping`, `Restarting`, `Reloaded` and `Deployed` mean
/// the request changed something; the rest are advisories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A new process was launched.
    Started,
    /// The shutdown command was issued; the process exits in the background.
    Stopping,
    /// A stop was issued and the server will be relaunched once it exits.
    Restarting,
    /// The server reloaded in place.
    Reloaded,
    /// The artifact was deployed to a server that already runs in the requested mode.
    Deployed,
    /// Nothing to start.
    AlreadyRunning,
    /// Nothing to stop.
    AlreadyStopped,
    /// A stop is already in flight; any pending restart was dropped.
    StopInProgress,
    /// A stop is already in flight; it now ends in a single relaunch.
    RestartCoalesced,
    /// The user dismissed a choice.
    Cancelled,
}

impl Outcome {
    /// Whether the request was a no-op because the server already was in the target state.
    pub fn is_advisory(self) -> bool {
        matches!(
            self,
            Outcome::AlreadyRunning
                | Outcome::AlreadyStopped
                | Outcome::StopInProgress
                | Outcome::RestartCoalesced
                | Outcome::Cancelled
        )
    }
}

/// Server lifecycle event types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerLifecycleEvent {
    /// Process launched
    Started,
    /// Process exited
    Stopped,
    /// Process is being relaunched after a restart request
    Restarted,
    /// Server reloaded in place
    Reloaded,
    /// Launch failed or a control command failed
    Failed,
    /// The watched configuration changed
    ConfigChanged,
}

/// Server lifecycle event
#[derive(Debug, Clone)]
pub struct ServerEvent {
    /// Instance the event belongs to
    pub instance: String,
    /// Launch the event belongs to, if any
    pub launch: Option<LaunchId>,
    /// Event type
    pub event: ServerLifecycleEvent,
    /// Event timestamp
    pub timestamp: Instant,
    /// Event details
    pub details: Option<String>,
}

/// Bounded history of lifecycle events, keyed by instance id.
#[derive(Clone, Default)]
pub struct ServerLifecycleLog {
    events: Arc<Mutex<Vec<ServerEvent>>>,
    launches: Arc<Mutex<HashMap<String, LaunchId>>>,
}

impl ServerLifecycleLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a server event
    pub fn record_event(
        &self,
        instance: &str,
        launch: Option<LaunchId>,
        event: ServerLifecycleEvent,
        details: Option<String>,
    ) -> Result<()> {
        if event == ServerLifecycleEvent::Started {
            if let Some(launch) = launch {
                let mut launches = self
                    .launches
                    .lock()
                    .map_err(|_| Error::Other("Failed to lock launch ids".to_string()))?;
                launches.insert(instance.to_string(), launch);
            }
        }

        let mut events = self
            .events
            .lock()
            .map_err(|_| Error::Other("Failed to lock server events".to_string()))?;
        events.push(ServerEvent {
            instance: instance.to_string(),
            launch,
            event,
            timestamp: Instant::now(),
            details,
        });
        if events.len() > MAX_EVENTS {
            events.remove(0);
        }

        Ok(())
    }

    /// Events of one instance, oldest first.
    pub fn events_for(&self, instance: &str) -> Result<Vec<ServerEvent>> {
        let events = self
            .events
            .lock()
            .map_err(|_| Error::Other("Failed to lock server events".to_string()))?;

        Ok(events
            .iter()
            .filter(|e| e.instance == instance)
            .cloned()
            .collect())
    }

    /// Number of events of `kind` recorded for an instance.
    pub fn count(&self, instance: &str, kind: ServerLifecycleEvent) -> Result<usize> {
        Ok(self
            .events_for(instance)?
            .iter()
            .filter(|e| e.event == kind)
            .count())
    }

    /// Launch id of the most recent process of an instance.
    pub fn last_launch(&self, instance: &str) -> Result<Option<LaunchId>> {
        let launches = self
            .launches
            .lock()
            .map_err(|_| Error::Other("Failed to lock launch ids".to_string()))?;
        Ok(launches.get(instance).copied())
    }

    /// Clear events
    pub fn clear_events(&self) -> Result<()> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| Error::Other("Failed to lock server events".to_string()))?;
        events.clear();
        Ok(())
    }

    /// Records an event, logging instead of failing.
    pub(crate) fn note(&self, instance: &str, launch: Option<LaunchId>, event: ServerLifecycleEvent, details: Option<String>) {
        if let Err(e) = self.record_event(instance, launch, event, details) {
            tracing::warn!(instance = %instance, error = %e, "Failed to record lifecycle event");
        }
    }
}
