#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wildfly_runner::host::HostServices;
use wildfly_runner::{RestartMode, RunnerConfig, WildflyRunner};

pub const STANDALONE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<server xmlns="urn:jboss:domain:20.0">
    <interfaces>
        <interface name="management">
            <inet-address value="${jboss.bind.address.management:127.0.0.1}"/>
        </interface>
    </interfaces>
    <socket-binding-group name="standard-sockets" default-interface="public">
        <socket-binding name="ajp" port="${jboss.ajp.port:8009}"/>
        <socket-binding name="http" port="${jboss.http.port:8080}"/>
        <socket-binding name="https" port="${jboss.https.port:8443}"/>
        <socket-binding name="management-http" interface="management" port="${jboss.management.http.port:9990}"/>
    </socket-binding-group>
</server>
"#;

/// Runs until `stop.flag` appears next to `bin`, logging its arguments.
/// Exits with status 3 when a `crash` file appears.
const STANDALONE_SH: &str = r#"#!/bin/sh
cd "$(dirname "$0")/.."
echo "$@" >> launches.log
rm -f stop.flag
echo "WFLYSRV0025: started"
while [ ! -f stop.flag ]; do
    if [ -f crash ]; then
        rm -f crash
        exit 3
    fi
    sleep 0.05
done
rm -f stop.flag
echo "WFLYSRV0050: stopped"
"#;

/// Logs its arguments; a shutdown creates `stop.flag` unless `hold` exists.
/// Fails when a `fail` file exists. A reload takes a second when a
/// `slow` file exists.
const JBOSS_CLI_SH: &str = r#"#!/bin/sh
cd "$(dirname "$0")/.."
echo "$@" >> cli.log
if [ -f fail ]; then
    echo "Failed to connect to the controller" >&2
    exit 1
fi
case "$*" in
    *:shutdown*) [ -f hold ] || touch stop.flag ;;
    *:reload*) [ -f slow ] && sleep 1 ;;
esac
exit 0
"#;

fn write_script(path: &Path, content: &str) {
    use std::os::unix::fs::PermissionsExt;

    std::fs::write(path, content).unwrap();
    let mut permissions = std::fs::metadata(path).unwrap().permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(path, permissions).unwrap();
}

/// Creates a minimal installation under `root/<name>`.
pub fn fake_installation(root: &Path, name: &str) -> PathBuf {
    let install = root.join(name);
    std::fs::create_dir_all(install.join("bin")).unwrap();
    std::fs::create_dir_all(install.join("modules").join("system")).unwrap();
    std::fs::create_dir_all(install.join("standalone").join("configuration")).unwrap();
    std::fs::create_dir_all(install.join("standalone").join("deployments")).unwrap();
    std::fs::write(install.join("jboss-modules.jar"), b"PK").unwrap();
    std::fs::write(
        install.join("standalone").join("configuration").join("standalone.xml"),
        STANDALONE_XML,
    )
    .unwrap();
    write_script(&install.join("bin").join("standalone.sh"), STANDALONE_SH);
    write_script(&install.join("bin").join("jboss-cli.sh"), JBOSS_CLI_SH);
    install
}

pub fn test_config(storage_root: &Path, mode: RestartMode) -> RunnerConfig {
    let mut config = RunnerConfig::new(storage_root);
    config.restart_mode = mode;
    config.watch_interval_ms = 20;
    config.attach_delay_ms = 10;
    config.stop_timeout_secs = 10;
    config
}

pub fn runner(storage_root: &Path, mode: RestartMode, host: HostServices) -> WildflyRunner {
    WildflyRunner::new(test_config(storage_root, mode))
        .unwrap()
        .with_host_services(host)
}

/// Polls `condition` until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

pub fn read_log(storage: &Path, file: &str) -> String {
    std::fs::read_to_string(storage.join(file)).unwrap_or_default()
}

pub fn touch(path: &Path) {
    std::fs::write(path, b"").unwrap();
}

pub fn config_path(storage: &Path) -> PathBuf {
    storage.join("standalone").join("configuration").join("standalone.xml")
}

pub fn headless() -> HostServices {
    HostServices::headless()
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
