// Datastore authorization server

use anyhow::{Context, Result};
use clap::Parser;
use datastore_server::{Server, ServerConfig};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "datastore")]
#[command(about = "Datastore server with capability-token authorization", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "./config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ServerConfig::load(Some(&cli.config))
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;

    // RUST_LOG wins over the configured level
    let level = if cli.verbose { "debug" } else { config.log.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let addr = config.socket_addr()?;
    let server = Server::from_config(&config)?;
    info!(%addr, tracing = config.server.tracing, "starting datastore server");

    server.run(addr, shutdown_signal()).await
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
