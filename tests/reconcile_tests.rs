#![cfg(unix)]

mod common;

use async_trait::async_trait;
use common::{config_path, eventually, fake_installation, headless, runner, STANDALONE_XML};
use mockall::mock;
use mockall::predicate::eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wildfly_runner::config::{ports, PortKind};
use wildfly_runner::error::Result;
use tokio::sync::Notify;
use wildfly_runner::host::{Confirmation, Prompter, RestartChoice, ServerPortChoice};
use wildfly_runner::server::reconcile::UNABLE_SHUTDOWN_URL;
use wildfly_runner::server::ServerLifecycleEvent;
use wildfly_runner::{RestartMode, ServerState, WildflyRunner};

const WAIT: Duration = Duration::from_secs(10);

mock! {
    pub Prompter {}

    #[async_trait]
    impl Prompter for Prompter {
        async fn select_server(&self, names: &[String]) -> Option<String>;
        async fn server_port_changed(&self, server: &str, launch_port: &str) -> Option<ServerPortChoice>;
        async fn config_changed(&self, server: &str) -> Option<RestartChoice>;
        async fn input_url_context(&self, server: &str) -> Option<String>;
        async fn confirm(&self, server: &str, question: Confirmation) -> bool;
        fn open_url(&self, url: &str);
    }
}

/// Holds every restart question open until released.
struct GatedPrompter {
    asked: AtomicUsize,
    release: Notify,
    answer: RestartChoice,
}

impl GatedPrompter {
    fn new(answer: RestartChoice) -> Arc<Self> {
        Arc::new(Self {
            asked: AtomicUsize::new(0),
            release: Notify::new(),
            answer,
        })
    }

    fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prompter for GatedPrompter {
    async fn select_server(&self, _names: &[String]) -> Option<String> {
        None
    }

    async fn server_port_changed(&self, _server: &str, _launch_port: &str) -> Option<ServerPortChoice> {
        None
    }

    async fn config_changed(&self, _server: &str) -> Option<RestartChoice> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.release.notified().await;
        Some(self.answer)
    }

    async fn input_url_context(&self, _server: &str) -> Option<String> {
        None
    }

    async fn confirm(&self, _server: &str, _question: Confirmation) -> bool {
        false
    }

    fn open_url(&self, _url: &str) {}
}

async fn started_gated(prompter: Arc<GatedPrompter>) -> Result<(tempfile::TempDir, WildflyRunner, std::path::PathBuf)> {
    let dirs = tempfile::tempdir()?;
    let install = fake_installation(dirs.path(), "srvA");
    let runner = runner(
        &dirs.path().join("storage"),
        RestartMode::Relaunch,
        headless().with_prompter(prompter),
    );
    let server = runner.add_server(&install).await?;
    runner.start_server(None).await?;
    let config = config_path(server.storage_path());
    Ok((dirs, runner, config))
}

fn event_count(runner: &WildflyRunner, instance: &str, kind: ServerLifecycleEvent) -> usize {
    runner.lifecycle().count(instance, kind).unwrap_or(0)
}

fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    (count.clone(), count)
}

async fn started(prompter: MockPrompter, mode: RestartMode) -> Result<(tempfile::TempDir, WildflyRunner, std::path::PathBuf)> {
    let dirs = tempfile::tempdir()?;
    let install = fake_installation(dirs.path(), "srvA");
    let runner = runner(
        &dirs.path().join("storage"),
        mode,
        headless().with_prompter(Arc::new(prompter)),
    );
    let server = runner.add_server(&install).await?;
    runner.start_server(None).await?;
    let config = config_path(server.storage_path());
    Ok((dirs, runner, config))
}

async fn stop(runner: &WildflyRunner) -> Result<()> {
    runner.stop_server(None).await?;
    runner.wait_for_state("srvA", ServerState::Idle, WAIT).await
}

#[tokio::test]
async fn test_server_port_change_offers_revert() -> Result<()> {
    let (asked, seen) = counter();
    let mut prompter = MockPrompter::new();
    prompter
        .expect_server_port_changed()
        .with(eq("srvA"), eq("${jboss.management.http.port:9990}"))
        .returning(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            Some(ServerPortChoice::Revert)
        });
    prompter.expect_config_changed().never();

    let (_dirs, runner, config) = started(prompter, RestartMode::Relaunch).await?;
    ports::set_port(&config, PortKind::Server, "9991").await?;

    // Reverting restores the file byte for byte and never restarts.
    assert!(
        eventually(WAIT, || {
            std::fs::read_to_string(&config).map(|xml| xml == STANDALONE_XML).unwrap_or(false)
        })
        .await
    );
    assert_eq!(asked.load(Ordering::SeqCst), 1);
    let instance = runner.find("srvA")?.instance_id();
    assert_eq!(
        runner.lifecycle().count(&instance, ServerLifecycleEvent::Started)?,
        1
    );
    assert_eq!(runner.find("srvA")?.state(), ServerState::Running);

    stop(&runner).await
}

#[tokio::test]
async fn test_server_port_change_more_info() -> Result<()> {
    let (opened, seen) = counter();
    let mut prompter = MockPrompter::new();
    prompter
        .expect_server_port_changed()
        .returning(|_, _| Some(ServerPortChoice::MoreInfo));
    prompter
        .expect_open_url()
        .withf(|url| url == UNABLE_SHUTDOWN_URL)
        .returning(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
    prompter.expect_config_changed().never();

    let (_dirs, runner, config) = started(prompter, RestartMode::Relaunch).await?;
    // Server and http port change together: only the server port is reported.
    let xml = std::fs::read_to_string(&config)?;
    let xml = ports::replace_port(&xml, PortKind::Server, "9991")?;
    let xml = ports::replace_port(&xml, PortKind::Http, "8081")?;
    std::fs::write(&config, xml)?;

    assert!(eventually(WAIT, || opened.load(Ordering::SeqCst) == 1).await);
    assert_eq!(ports::get_port(&config, PortKind::Server).await?, "9991");

    // Back to the launch-time ports before stopping.
    std::fs::write(&config, STANDALONE_XML)?;
    stop(&runner).await
}

#[tokio::test]
async fn test_http_port_change_restarts_on_request() -> Result<()> {
    let mut prompter = MockPrompter::new();
    prompter
        .expect_config_changed()
        .with(eq("srvA"))
        .times(1)
        .returning(|_| Some(RestartChoice::RestartNow));
    prompter.expect_server_port_changed().never();

    let (_dirs, runner, config) = started(prompter, RestartMode::Reload).await?;
    let instance = runner.find("srvA")?.instance_id();
    ports::set_port(&config, PortKind::Http, "8081").await?;

    assert!(
        eventually(WAIT, || {
            runner
                .lifecycle()
                .count(&instance, ServerLifecycleEvent::Reloaded)
                .unwrap_or(0)
                == 1
        })
        .await
    );
    // Never reverted.
    assert_eq!(ports::get_port(&config, PortKind::Http).await?, "8081");
    assert_eq!(runner.find("srvA")?.state(), ServerState::Running);

    stop(&runner).await
}

#[tokio::test]
async fn test_unrelated_change_is_ignored() -> Result<()> {
    let mut prompter = MockPrompter::new();
    prompter.expect_config_changed().never();
    prompter.expect_server_port_changed().never();

    let (_dirs, runner, config) = started(prompter, RestartMode::Relaunch).await?;
    let instance = runner.find("srvA")?.instance_id();
    let xml = std::fs::read_to_string(&config)?.replace("8009", "8010");
    std::fs::write(&config, xml)?;

    assert!(
        eventually(WAIT, || {
            runner
                .lifecycle()
                .count(&instance, ServerLifecycleEvent::ConfigChanged)
                .unwrap_or(0)
                >= 1
        })
        .await
    );
    tokio::time::sleep(Duration::from_millis(100)).await;

    stop(&runner).await
}

#[tokio::test]
async fn test_never_again_suppresses_later_prompts() -> Result<()> {
    let (asked, seen) = counter();
    let mut prompter = MockPrompter::new();
    prompter.expect_config_changed().returning(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        Some(RestartChoice::Never)
    });
    prompter.expect_server_port_changed().never();

    let (dirs, runner, config) = started(prompter, RestartMode::Relaunch).await?;
    let instance = runner.find("srvA")?.instance_id();

    ports::set_port(&config, PortKind::Http, "8081").await?;
    assert!(eventually(WAIT, || !runner.settings().restart_prompts_enabled()).await);

    ports::set_port(&config, PortKind::Https, "9443").await?;
    assert!(
        eventually(WAIT, || {
            runner
                .lifecycle()
                .count(&instance, ServerLifecycleEvent::ConfigChanged)
                .unwrap_or(0)
                >= 2
        })
        .await
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(asked.load(Ordering::SeqCst), 1);

    // The preference is flushed to disk.
    let settings = std::fs::read_to_string(dirs.path().join("storage").join("settings.json"))?;
    assert!(settings.contains("\"restartOnHttpPortChange\": false"));

    stop(&runner).await
}

#[tokio::test]
async fn test_open_prompt_absorbs_further_changes() -> Result<()> {
    let prompter = GatedPrompter::new(RestartChoice::RestartNow);
    let (_dirs, runner, config) = started_gated(prompter.clone()).await?;
    let instance = runner.find("srvA")?.instance_id();

    ports::set_port(&config, PortKind::Http, "8081").await?;
    assert!(eventually(WAIT, || prompter.asked() == 1).await);

    ports::set_port(&config, PortKind::Https, "9443").await?;
    assert!(
        eventually(WAIT, || {
            event_count(&runner, &instance, ServerLifecycleEvent::ConfigChanged) >= 2
        })
        .await
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(prompter.asked(), 1);

    // Answering the one open question restarts once.
    prompter.release.notify_one();
    assert!(
        eventually(WAIT, || {
            event_count(&runner, &instance, ServerLifecycleEvent::Started) == 2
                && runner.find("srvA").map(|r| r.state() == ServerState::Running).unwrap_or(false)
        })
        .await
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(event_count(&runner, &instance, ServerLifecycleEvent::Started), 2);
    assert_eq!(prompter.asked(), 1);

    stop(&runner).await
}

#[tokio::test]
async fn test_not_now_keeps_server_and_asks_again() -> Result<()> {
    let (asked, seen) = counter();
    let mut prompter = MockPrompter::new();
    prompter
        .expect_config_changed()
        .with(eq("srvA"))
        .returning(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Some(RestartChoice::NotNow)
        });
    prompter.expect_server_port_changed().never();

    let (_dirs, runner, config) = started(prompter, RestartMode::Relaunch).await?;
    let instance = runner.find("srvA")?.instance_id();

    ports::set_port(&config, PortKind::Http, "8081").await?;
    assert!(eventually(WAIT, || asked.load(Ordering::SeqCst) == 1).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(runner.settings().restart_prompts_enabled());
    assert_eq!(runner.find("srvA")?.state(), ServerState::Running);
    assert_eq!(event_count(&runner, &instance, ServerLifecycleEvent::Started), 1);

    // Not now is not never: the next change asks again.
    ports::set_port(&config, PortKind::Https, "9443").await?;
    assert!(eventually(WAIT, || asked.load(Ordering::SeqCst) == 2).await);
    assert_eq!(ports::get_port(&config, PortKind::Http).await?, "8081");
    assert_eq!(event_count(&runner, &instance, ServerLifecycleEvent::Started), 1);

    stop(&runner).await
}
