//! Warden agent daemon.
//!
//! Keeps the managed artifact running and reconciles it against the
//! remote authority. Runs in the foreground until SIGINT/SIGTERM;
//! service-hosting (systemd unit, service wrapper) is external.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wardend::config::Config;
use wardend::scheduler::{AgentCore, Scheduler};

#[derive(Parser)]
#[command(name = "wardend", version, about = "Update-and-supervise agent for a managed artifact")]
struct Cli {
    /// Path to the agent configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!("[BOOT] wardend v{} starting", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load(),
    };
    info!("[BOOT] managed directory: {}", config.managed_dir().display());
    info!("[BOOT] version oracle: {}", config.remote.version_url);

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let core = Arc::new(Mutex::new(AgentCore::from_config(&config)));
    let scheduler = Scheduler::new(core, &config, shutdown);

    info!("[READY] wardend operational");
    scheduler.run().await;

    info!("[SHUTDOWN] wardend stopped");
    Ok(())
}

/// SIGINT/SIGTERM cancel the shared token; the loops exit at their next
/// iteration boundary. A replace sequence already underway runs to
/// completion first.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    warn!("cannot register SIGTERM handler: {}", e);
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("SIGINT received, shutting down"),
                _ = sigterm.recv() => info!("SIGTERM received, shutting down"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("interrupt received, shutting down");
        }
        shutdown.cancel();
    });
}
