use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use wildfly_runner::host::{
    Confirmation, HostServices, LogDebugLauncher, Prompter, RestartChoice, ServerPortChoice, TracingOutput,
};
use wildfly_runner::{RunnerConfig, WildflyRunner};

/// Asks questions on the terminal.
struct TerminalPrompter;

impl TerminalPrompter {
    async fn ask(&self, question: &str, choices: &[&str]) -> Option<usize> {
        let mut stdout = tokio::io::stdout();
        let mut prompt = format!("{}\n", question);
        for (i, choice) in choices.iter().enumerate() {
            prompt.push_str(&format!("  [{}] {}\n", i + 1, choice));
        }
        prompt.push_str("> ");
        stdout.write_all(prompt.as_bytes()).await.ok()?;
        stdout.flush().await.ok()?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await.ok()?;
        let picked: usize = line.trim().parse().ok()?;
        (1..=choices.len()).contains(&picked).then(|| picked - 1)
    }
}

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn select_server(&self, names: &[String]) -> Option<String> {
        let choices: Vec<&str> = names.iter().map(String::as_str).collect();
        let picked = self.ask("Select a server:", &choices).await?;
        names.get(picked).cloned()
    }

    async fn server_port_changed(&self, server: &str, launch_port: &str) -> Option<ServerPortChoice> {
        let question = format!(
            "The management port of {} changed while it runs. Revert it to {}?",
            server, launch_port
        );
        match self.ask(&question, &["Revert", "Ignore", "More info"]).await? {
            0 => Some(ServerPortChoice::Revert),
            1 => Some(ServerPortChoice::Ignore),
            _ => Some(ServerPortChoice::MoreInfo),
        }
    }

    async fn config_changed(&self, server: &str) -> Option<RestartChoice> {
        let question = format!("The http(s) port of {} changed. Restart it now?", server);
        match self.ask(&question, &["Restart now", "Not now", "Never ask again"]).await? {
            0 => Some(RestartChoice::RestartNow),
            1 => Some(RestartChoice::NotNow),
            _ => Some(RestartChoice::Never),
        }
    }

    async fn input_url_context(&self, server: &str) -> Option<String> {
        let mut stdout = tokio::io::stdout();
        let prompt = format!("URL context of {} (example: shop/cart): ", server);
        stdout.write_all(prompt.as_bytes()).await.ok()?;
        stdout.flush().await.ok()?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await.ok()?;
        Some(line.trim().to_string()).filter(|context| !context.is_empty())
    }

    async fn confirm(&self, server: &str, question: Confirmation) -> bool {
        let question = match question {
            Confirmation::StartBeforeBrowsing => format!("{} needs to be started before browsing. Start it now?", server),
            Confirmation::DeleteRunningServer => format!("{} is running. Delete it anyway?", server),
        };
        self.ask(&question, &["Yes", "No"]).await == Some(0)
    }

    fn open_url(&self, url: &str) {
        println!("Open {}", url);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let install_path = PathBuf::from(
        args.next()
            .context("usage: wildfly_console <wildfly install dir> [app.war]")?,
    );
    let artifact = args.next().map(PathBuf::from);

    let storage_root = std::env::temp_dir().join("wildfly-runner-demo");
    std::fs::create_dir_all(&storage_root)?;

    // Console output follows RUST_LOG; the file log keeps everything at debug level.
    let file_appender = tracing_appender::rolling::never(&storage_root, "wildfly_console.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_filter(EnvFilter::from_default_env()))
        .with(
            fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_filter(EnvFilter::new("wildfly_runner=debug")),
        )
        .init();

    tracing::info!("Starting wildfly_console example");

    let host = HostServices::headless()
        .with_prompter(Arc::new(TerminalPrompter))
        .with_debugger(Arc::new(LogDebugLauncher))
        .with_output(Arc::new(TracingOutput));
    let runner = WildflyRunner::new(RunnerConfig::new(&storage_root))?.with_host_services(host);

    let existing = runner
        .list_servers()?
        .into_iter()
        .find(|record| record.install_path() == install_path.as_path());
    let server = match existing {
        Some(server) => server,
        None => runner.add_server(Path::new(&install_path)).await?,
    };
    println!("Using server {} at {}", server.name(), server.storage_path().display());

    let outcome = match &artifact {
        Some(war) => runner.run_on_server(war, false, Some(server.name()), &[]).await?,
        None => runner.start_server(Some(server.name())).await?,
    };
    println!("{:?}", outcome);
    if let Ok(url) = runner.browse_url(server.name()).await {
        println!("Browse {}", url);
    }

    println!("Press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    runner.shutdown().await?;
    println!("Stopped");
    Ok(())
}
