//! Demo binary: serves a small router until Ctrl+C, then shuts down gracefully.

use std::path::PathBuf;
use std::time::Duration;

use axum::{routing::get, Router};
use clap::Parser;

use http_lifecycle::observability::init_logging;
use http_lifecycle::HttpServer;

#[derive(Parser)]
#[command(name = "http-lifecycle")]
#[command(about = "Run an HTTP server with a graceful-shutdown lifecycle", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address, overrides the configuration file.
    #[arg(short, long)]
    address: Option<String>,

    /// Shutdown grace period in milliseconds, overrides the configuration file.
    #[arg(long)]
    shutdown_timeout_ms: Option<u64>,
}

fn app() -> Router {
    Router::new()
        .route("/", get(|| async { "http-lifecycle" }))
        .route("/health", get(|| async { "ok" }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging("http_lifecycle=debug");

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "http-lifecycle starting");

    let mut builder = HttpServer::builder().address("0.0.0.0:8080");
    if let Some(path) = &cli.config {
        builder = builder.config_file(path);
    }
    if let Some(address) = cli.address {
        builder = builder.address(address);
    }
    if let Some(ms) = cli.shutdown_timeout_ms {
        builder = builder.shutdown_timeout(Duration::from_millis(ms));
    }
    let server = builder.router(app()).build()?;

    let address = server.run()?.ready().await?;
    tracing::info!(address = %address, "Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    server.close().await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
