//! server-proxy
//!
//! Authenticated reverse proxy in front of local and supervised backends.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ access control ──▶ routing registry
//!                                                             │
//!                          ┌──────────────────────────────────┤
//!                          ▼                                  ▼
//!                   process supervisor                   proxy core
//!                   (spawn + probe)              (HTTP buffered / progressive,
//!                                                 WebSocket relay)
//!                                                             │
//!     Client Response                                         ▼
//!     ◀────────────── rewrite pipeline ◀──────────── backend (TCP / Unix socket)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use server_proxy::config::loader::load_config;
use server_proxy::config::watcher::ConfigWatcher;
use server_proxy::lifecycle::signals::spawn_signal_handler;
use server_proxy::observability::{logging, metrics};
use server_proxy::{HttpServer, ProxyConfig, Shutdown};

#[derive(Debug, Parser)]
#[command(name = "server-proxy", version, about = "Authenticated reverse proxy for local backend servers")]
struct Cli {
    /// TOML configuration file; watched for allowlist changes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(long)]
    bind: Option<String>,

    /// Override `base_url`.
    #[arg(long)]
    base_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "server-proxy starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let (_watcher, config_updates) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    let signals = spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, shutdown_rx).await?;

    signals.abort();
    tracing::info!("Shutdown complete");
    Ok(())
}
