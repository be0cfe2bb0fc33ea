//! API gateway binary.
//!
//! Startup order: CLI → config (degrading to defaults when the file is
//! absent or broken, like the deployment's config-service fallback) →
//! logging → metrics exporter → HTTP server with graceful shutdown.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use api_gateway::config::{load_config, GatewayConfig};
use api_gateway::http::HttpServer;
use api_gateway::lifecycle::{signals, Shutdown};
use api_gateway::observability::{logging, metrics};

#[derive(Debug, Parser)]
#[command(name = "api-gateway", about = "Resilient API gateway with failover")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (config, load_error) = match &args.config {
        Some(path) => match load_config(path) {
            Ok(config) => (config, None),
            Err(e) => (GatewayConfig::default(), Some(e)),
        },
        None => (GatewayConfig::default(), None),
    };
    let config = config.with_env_overrides();

    logging::init(&config.observability);

    if let Some(e) = load_error {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        services = config.services.len(),
        failure_threshold = config.breaker.failure_threshold,
        retry_attempts = config.retry.max_attempts,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        signals::shutdown_on_signal(&shutdown).await;
    });

    HttpServer::new(config).run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
