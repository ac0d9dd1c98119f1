//! Server management module for WildFly Runner.
//!
//! This module holds the building blocks of a managed server: its record and
//! state, the control scripts that launch and stop it, the lifecycle history,
//! and the configuration watcher with its reconciliation policy. The
//! [`WildflyRunner`](crate::WildflyRunner) ties them together.
//!
//! # Components
//!
//! * `record` - The per-server record and its state
//! * `process` - Launching the vendor control scripts
//! * `lifecycle` - Request outcomes and the lifecycle event history
//! * `monitor` - Polling the active configuration file
//! * `reconcile` - Deciding what a configuration change means
//!
//! # Examples
//!
//! Recording lifecycle events:
//!
//! ```no_run
//! use wildfly_runner::server::{ServerLifecycleEvent, ServerLifecycleLog};
//!
//! let log = ServerLifecycleLog::new();
//! log.record_event("srvA", None, ServerLifecycleEvent::Failed, Some("no java".to_string()))
//!     .unwrap();
//! assert_eq!(log.count("srvA", ServerLifecycleEvent::Failed).unwrap(), 1);
//! ```
//!
//! Deciding on a configuration change:
//!
//! ```no_run
//! use wildfly_runner::config::PortSnapshot;
//! use wildfly_runner::server::{reconcile, Reconciliation};
//!
//! let launched = PortSnapshot { server: "9990".into(), http: "8080".into(), https: "8443".into() };
//! let edited = PortSnapshot { http: "8081".into(), ..launched.clone() };
//! assert_eq!(reconcile(&launched, &edited, true), Reconciliation::RestartAdvised);
//! ```
pub mod lifecycle;
pub mod monitor;
mod process;
pub mod reconcile;
pub mod record;

pub use lifecycle::{Outcome, ServerEvent, ServerLifecycleEvent, ServerLifecycleLog};
pub use monitor::{ConfigChange, ConfigWatcher, WatchHandle};
pub use process::{script_extension, ControlCommand, ControlScript, LaunchId, ServerProcess};
pub use reconcile::{reconcile, PromptGuard, Reconciler, Reconciliation, Restarter};
pub use record::{ServerRecord, ServerState};
