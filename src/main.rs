//! route-dispatch server.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌───────────────────────────────────────────────────────┐
//!                 │                    ROUTE DISPATCH                     │
//!   Request       │  ┌─────────┐   ┌────────────┐   ┌──────────────────┐  │
//!  ───────────────┼─▶│  http   │──▶│  dispatch  │──▶│ routing registry │  │
//!                 │  │ server  │   │ dispatcher │   │ exact + patterns │  │
//!                 │  └─────────┘   └─────┬──────┘   └──────────────────┘  │
//!                 │                      │ task                           │
//!                 │                      ▼                                │
//!                 │        ┌──────────────────────────────┐               │
//!                 │        │ scheduler (+ timeout)        │               │
//!                 │        │  "biz" pool  │  "io" direct  │               │
//!                 │        └──────────────┬───────────────┘               │
//!                 │                       ▼                               │
//!   Response      │        handler → callbacks → exception handler        │
//!  ◀──────────────┼──────────────── committed response                    │
//!                 │                                                       │
//!                 │  config · lifecycle · observability                   │
//!                 └───────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use route_dispatch::config::{load_config, ServerConfig};
use route_dispatch::http::HttpServer;
use route_dispatch::lifecycle::{signals, Shutdown};
use route_dispatch::observability::{logging, metrics};

#[derive(Debug, Parser)]
#[command(name = "route-dispatch", version, about = "Predicate-based request router and dispatcher")]
struct Cli {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?cli.config,
        "route-dispatch starting"
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

    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    signals::spawn_signal_listener(shutdown);

    server.run(listener, shutdown_rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
