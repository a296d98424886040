//! Hermes inference sidecar
//!
//! Fronts an Ollama-compatible server, bounds concurrent generations per
//! model and enforces per-request deadlines.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────────▶ http server ──▶ dispatcher ──▶ slot manager (admit / release)
//!                                        │
//!                                        ▼
//!                                   upstream client ──▶ POST /api/generate ──▶ Ollama
//!     Client Response                    │
//!     ◀───────────── JSON / NDJSON ◀─────┘
//!
//!     Cross-cutting: config (+ hot reload), health monitor,
//!                    observability, lifecycle
//! ```

use clap::Parser;
use notify::RecommendedWatcher;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use hermes::config::watcher::ConfigWatcher;
use hermes::config::{load_config, loader::load_from_env, validation};
use hermes::lifecycle::signals::spawn_signal_handler;
use hermes::observability::{logging, metrics};
use hermes::{HttpServer, Shutdown, SidecarConfig};

#[derive(Parser)]
#[command(name = "hermes", version, about = "Local inference sidecar")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long, env = "HERMES_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => load_from_env()?,
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "hermes starting");

    tracing::info!(
        bind_address = %config.server.bind_address,
        upstream = %config.upstream.base_url,
        models = ?config.models.keys().collect::<Vec<_>>(),
        default_timeout_ms = config.upstream.default_timeout_ms,
        "Configuration loaded"
    );
    for warning in validation::config_warnings(&config) {
        tracing::warn!(field = %warning.field, "{}", warning.message);
    }

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

    // The watcher handle must outlive the server.
    let (_watcher, updates) = match &args.config {
        Some(path) => watch_config(path),
        None => (None, None),
    };

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config)?;
    server.run(listener, updates, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn watch_config(
    path: &Path,
) -> (Option<RecommendedWatcher>, Option<mpsc::UnboundedReceiver<SidecarConfig>>) {
    let (watcher, updates) = ConfigWatcher::new(path);
    match watcher.run() {
        Ok(handle) => (Some(handle), Some(updates)),
        Err(e) => {
            tracing::warn!(error = %e, "Config hot reload disabled");
            (None, None)
        }
    }
}
