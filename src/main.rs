#![forbid(unsafe_code)]

//! `pull-bridge`: web UI server with a streaming pull endpoint.
//!
//! Bootstraps configuration, then serves the static web UI and
//! `GET /pull_model` on one port until SIGINT or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use pull_bridge::bridge::CommandLauncher;
use pull_bridge::http::{self, AppState};
use pull_bridge::{AppError, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "pull-bridge", about = "Ollama web UI server with streaming model pulls", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the HTTP port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the directory static assets are served from.
    #[arg(long)]
    web_root: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("pull-bridge bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::from_toml_str("")?,
    };

    if let Some(port) = args.port {
        config.http_port = port;
    }
    if let Some(root) = args.web_root {
        config.set_web_root(root)?;
    }

    let config = Arc::new(config);
    info!(
        command = %config.pull_command,
        max_concurrent_pulls = config.max_concurrent_pulls,
        pull_timeout_seconds = config.pull_timeout_seconds,
        "configuration loaded"
    );

    // ── Build shared application state ──────────────────
    let ct = CancellationToken::new();
    let launcher = Arc::new(CommandLauncher::from_config(&config));
    let state = Arc::new(AppState::new(Arc::clone(&config), launcher, ct.clone()));

    // ── Start HTTP server ───────────────────────────────
    let server_ct = ct.clone();
    let mut server = tokio::spawn(async move { http::serve(state, server_ct).await });

    // ── Wait for shutdown signal or server failure ──────
    let joined = tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received");
            ct.cancel();
            server.await
        }
        joined = &mut server => joined,
    };

    match joined {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            error!(%err, "HTTP server failed");
            return Err(err);
        }
        Err(err) => {
            return Err(AppError::Config(format!("HTTP server task panicked: {err}")));
        }
    }

    info!("pull-bridge shut down");
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
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
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
