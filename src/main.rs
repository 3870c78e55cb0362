//! storage-proxy
//!
//! ```text
//!   client ──▶ ProxyServer ──▶ ProxyRouter ──▶ ResponseCache (GET hit?)
//!                                   │
//!                                   ▼ miss
//!                            ServiceRegistry.select ──▶ ConnectionPool.acquire
//!                                                              │
//!   client ◀── X-Service-Name / X-Cache ◀── cache store ◀── upstream call
//!
//!   background: HealthMonitor probes, cache sweeper, pool sweeper
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use storage_proxy::config::{load_config, loader::apply_env_overrides, ProxyConfig};
use storage_proxy::lifecycle::signals::shutdown_on_signal;
use storage_proxy::observability::{logging, metrics};
use storage_proxy::{ProxyContext, ProxyServer, Shutdown};

#[derive(Debug, Parser)]
#[command(name = "storage-proxy", version, about = "Health-aware caching reverse proxy")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "CONFIG_FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => {
            let mut config = ProxyConfig::default();
            apply_env_overrides(&mut config, |key| std::env::var(key).ok());
            config
        }
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "storage-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        services = config.services.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let bind_address = config.listener.bind_address.clone();
    let ctx = ProxyContext::from_config(config)?;

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = ProxyServer::new(ctx);
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        _ = shutdown_on_signal(&shutdown) => server_task.await??,
        result = &mut server_task => result??,
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
