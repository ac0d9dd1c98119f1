//! Configuration module for WildFly Runner.
//!
//! This module covers two kinds of configuration: the runner's own settings
//! ([`RunnerConfig`], loaded from JSON or YAML) and the files of a managed
//! server copy (the XML socket bindings in [`ports`] and the `jvm.options`
//! file in [`options`]).
//!
//! # Examples
//!
//! Loading a configuration from a file:
//!
//! ```no_run
//! use wildfly_runner::config::RunnerConfig;
//!
//! let config = RunnerConfig::from_file("wildfly-runner.yaml").unwrap();
//! println!("Servers live under {}", config.servers_dir().display());
//! ```
//!
//! Reading a port of a server copy:
//!
//! ```no_run
//! use wildfly_runner::config::{ports, PortKind};
//! use std::path::Path;
//!
//! # async fn run() -> wildfly_runner::Result<()> {
//! let config = Path::new("/srv/wf/standalone/configuration/standalone.xml");
//! let http = ports::get_port(config, PortKind::Http).await?;
//! println!("HTTP port expression: {}", http);
//! # Ok(())
//! # }
//! ```
pub mod options;
mod parser;
pub mod ports;
pub mod validator;

pub use parser::{RestartMode, RunnerConfig};
pub use ports::{PortKind, PortSnapshot};
pub use validator::validate_config;
