#![forbid(unsafe_code)]

//! `z5bot` — interactive-fiction chat bot server binary.
//!
//! Loads configuration, builds the story catalogue and session registry,
//! and serves chat messages over the local IPC socket until shut down.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use z5bot::chat::{Bot, BotState};
use z5bot::config::GlobalConfig;
use z5bot::ipc::spawn_ipc_server;
use z5bot::savegame::SaveProtocol;
use z5bot::session::spawn_idle_reaper;
use z5bot::session::SessionRegistry;
use z5bot::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "z5bot", about = "Interactive-fiction chat bot server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the IPC socket name from the configuration.
    #[arg(long)]
    ipc_name: Option<String>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("z5bot server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(name) = args.ipc_name {
        config.ipc_name = name;
    }

    let catalog = config.catalog();
    if catalog.is_empty() {
        warn!("story catalogue is empty; /select will have nothing to offer");
    }
    info!(stories = catalog.len(), "configuration loaded");

    // ── Build shared state ──────────────────────────────
    let registry = Arc::new(SessionRegistry::from_config(&config)?);
    let saves = SaveProtocol::from_config(&config.saves)?;
    let bot = Arc::new(Bot::new(BotState {
        catalog,
        registry: Arc::clone(&registry),
        saves,
    }));

    // ── Start background tasks ──────────────────────────
    let ct = CancellationToken::new();
    let reaper_handle = spawn_idle_reaper(
        Arc::clone(&registry),
        config.idle_eviction(),
        Duration::from_secs(config.sessions.reaper_interval_seconds),
        ct.clone(),
    );
    let ipc_handle = spawn_ipc_server(Arc::clone(&bot), &config.ipc_name, ct.clone())?;

    info!(
        ipc_name = %config.ipc_name,
        max_sessions = config.sessions.max_concurrent_sessions,
        "z5bot ready"
    );

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    registry.shutdown().await;

    let (reaper, ipc) = tokio::join!(reaper_handle, ipc_handle);
    for (task, result) in [("reaper", reaper), ("ipc", ipc)] {
        if let Err(err) = result {
            warn!(task, %err, "background task ended abnormally");
        }
    }
    info!("z5bot shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
