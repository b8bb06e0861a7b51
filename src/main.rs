use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::config::{LogFormat, LoggingConfig, TurnstileConfig};
use turnstile::http::{AppState, HttpServer};
use turnstile::ratelimit::{Policy, QuotaStore, RateLimiter};

#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about = "Rate limit policy engine for LLM gateways")]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "TURNSTILE_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP admission service (default)
    Serve {
        /// Override the configured listen address
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Parse a policy string and print its canonical form
    Validate { policy: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Validate { policy }) = &cli.command {
        let policy: Policy = policy.parse()?;
        println!("{}", policy);
        return Ok(());
    }

    let mut config = TurnstileConfig::load(cli.config.as_deref())?;
    if let Some(Command::Serve { listen: Some(addr) }) = cli.command {
        config.server.listen_addr = addr;
    }

    init_tracing(&config.logging);

    info!("Starting Turnstile Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(listen_addr = %config.server.listen_addr, "Configuration loaded");

    let store = Arc::new(QuotaStore::new());
    let rate_limiter = Arc::new(RateLimiter::new(store));
    let state = AppState::from_config(rate_limiter, &config.rate_limiting)?;
    info!("Rate limiter initialized");

    HttpServer::new(config.server.listen_addr, state)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    info!("Turnstile Rate Limiting Service stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
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
