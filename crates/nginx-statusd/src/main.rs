//! nginx-statusd — standalone nginx stub_status poller.
//!
//! Runs one poller and writes every record to stdout as a JSON line.
//! Logs go to stderr.
//!
//! # Usage
//!
//! ```text
//! nginx-statusd --config /etc/nginx-statusd.toml
//! RUST_LOG=debug nginx-statusd
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use nginx_status::{JsonLinesSink, StatusInput};
use tracing::{error, info};

use crate::config::DaemonConfig;

#[derive(Parser)]
#[command(name = "nginx-statusd", about = "Poll nginx stub_status and emit JSON records")]
struct Cli {
    /// Path to the TOML config file. Without it every default applies.
    #[arg(long, short)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,nginx_status=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    let daemon_config = match &cli.config {
        Some(path) => DaemonConfig::from_file(path)?,
        None => DaemonConfig::default(),
    };

    let sink = Arc::new(JsonLinesSink::new(std::io::stdout()));
    let mut input = StatusInput::configure(&daemon_config.source, sink)
        .context("invalid [source] configuration")?;
    input.start()?;

    // ── Wait for Ctrl-C or a dead poller ───────────────────────

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let exit = runtime.block_on(wait_for_exit(tokio::signal::ctrl_c(), || input.is_running()))?;

    match exit {
        Exit::Signal => {
            info!("shutdown signal received");
            input.shutdown()?;
            Ok(())
        }
        Exit::PollerDied => {
            error!("poller thread exited unexpectedly");
            input
                .shutdown()
                .context("poller thread exited unexpectedly")?;
            anyhow::bail!("poller thread exited unexpectedly")
        }
    }
}

/// How often the poller thread is checked for liveness.
const LIVENESS_CHECK: Duration = Duration::from_secs(1);

#[derive(Debug, PartialEq, Eq)]
enum Exit {
    Signal,
    PollerDied,
}

/// Block until `signal` resolves or `is_alive` turns false.
async fn wait_for_exit<F>(signal: F, is_alive: impl Fn() -> bool) -> anyhow::Result<Exit>
where
    F: Future<Output = std::io::Result<()>>,
{
    tokio::pin!(signal);
    let mut check = tokio::time::interval(LIVENESS_CHECK);
    loop {
        tokio::select! {
            result = &mut signal => {
                result.context("failed to install CTRL+C handler")?;
                return Ok(Exit::Signal);
            }
            _ = check.tick() => {
                if !is_alive() {
                    return Ok(Exit::PollerDied);
                }
            }
        }
    }
}
