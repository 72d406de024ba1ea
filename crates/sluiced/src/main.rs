//! sluiced — the Sluice console daemon.
//!
//! Single binary that assembles:
//! - Dashboard settings (TOML file + `SLUICE_*` env overrides)
//! - Application registry + reaper
//! - In-memory metrics store + aggregator
//! - REST API
//!
//! # Usage
//!
//! ```text
//! sluiced serve --port 8080 --config /etc/sluice/dashboard.toml
//! sluiced print-config
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sluice_api::{ApiState, build_router};
use sluice_core::{DashboardSettings, SettingsHandle, SystemClock};
use sluice_metrics::{InMemoryMetricsRepository, MetricsAggregator};
use sluice_registry::{AppRegistry, Liveness};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "sluiced", about = "Sluice console daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the registry and API server.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Dashboard settings file (TOML). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the effective settings as TOML and exit.
    PrintConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Command::Serve { port, config } => run_serve(port, config.as_deref()).await,
        Command::PrintConfig { config } => {
            let settings = load_settings(config.as_deref())?;
            print!("{}", settings.load().to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,sluiced=debug,sluice=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_settings(config: Option<&Path>) -> anyhow::Result<SettingsHandle> {
    match config {
        Some(path) => SettingsHandle::from_file(path),
        None => {
            let mut settings = DashboardSettings::default();
            settings.apply_env_overrides();
            Ok(SettingsHandle::new(settings))
        }
    }
}

async fn run_serve(port: u16, config: Option<&Path>) -> anyhow::Result<()> {
    info!("Sluice daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    let settings = load_settings(config)?;
    info!(settings = ?settings.load(), "dashboard settings loaded");

    let clock = SystemClock::shared();
    let registry = AppRegistry::new(Liveness::new(clock.clone(), settings.clone()));

    let store = InMemoryMetricsRepository::new(clock.clone(), settings.clone());
    let aggregator = Arc::new(MetricsAggregator::new(Arc::new(store), clock));

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Background tasks ───────────────────────────────────────

    let reaper = registry.clone();
    let reaper_shutdown = shutdown_rx.clone();
    let reaper_handle = tokio::spawn(async move {
        reaper.run(reaper_shutdown).await;
    });

    let reload_handle = spawn_reload_on_hangup(settings, shutdown_rx)?;

    // ── API server ─────────────────────────────────────────────

    let router = build_router(ApiState {
        registry,
        aggregator,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    let _ = reaper_handle.await;
    if let Some(handle) = reload_handle {
        let _ = handle.await;
    }

    info!("Sluice daemon stopped");
    Ok(())
}

/// Re-read the settings file on SIGHUP. A failed reload keeps the
/// previous settings.
#[cfg(unix)]
fn spawn_reload_on_hangup(
    settings: SettingsHandle,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<Option<tokio::task::JoinHandle<()>>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    match settings.reload() {
                        Ok(true) => info!("settings reloaded on SIGHUP"),
                        Ok(false) => info!("SIGHUP ignored, no settings file"),
                        Err(e) => warn!(error = %e, "settings reload failed, keeping previous values"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    });
    Ok(Some(handle))
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(
    _settings: SettingsHandle,
    _shutdown: watch::Receiver<bool>,
) -> anyhow::Result<Option<tokio::task::JoinHandle<()>>> {
    Ok(None)
}
