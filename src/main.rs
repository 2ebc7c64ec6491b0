use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use turnstile::config::TurnstileConfig;
use turnstile::http::{self, HttpServer, KeyExtractor};
use turnstile::ratelimit::{RateLimiter, Sweeper};

/// Admission-control front for the blog API.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "TURNSTILE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the HTTP bind address
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).with_thread_ids(true))
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
    }

    info!("Starting Turnstile");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // A malformed policy stops the process here, before anything is served.
    let mut config =
        TurnstileConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(addr) = cli.http_addr {
        config.server.http_addr = addr;
    }

    let policy = config.rate_limiting.policy()?;
    let retention = config.rate_limiting.retention()?;
    let extractor = KeyExtractor::from_config(&config.rate_limiting)?;
    info!(
        http_addr = %config.server.http_addr,
        enabled = policy.enabled(),
        max_requests = policy.max_requests(),
        window_ms = policy.window().as_millis() as u64,
        key_strategy = ?config.rate_limiting.key_strategy,
        "Configuration loaded"
    );

    // Initialize the rate limiter
    let rate_limiter = Arc::new(RateLimiter::new(policy).with_retention(retention));
    let sweeper = Sweeper::spawn(rate_limiter.clone(), config.rate_limiting.sweep_interval());

    let app = http::app(&config.server, rate_limiter, extractor);
    let server = HttpServer::new(config.server.http_addr, app, config.server.shutdown_grace());

    // Run the server with graceful shutdown on Ctrl+C
    let served = server.serve_with_shutdown(shutdown_signal()).await;
    sweeper.shutdown().await;
    served?;

    info!("Turnstile stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
