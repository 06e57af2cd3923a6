//! HTTP server binary.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ listener ─▶ request id ─▶ body limit ─▶ request log ─▶ response log ─▶ handler
//!                                                              (capture)      (tee)
//!     Client Response
//!     ◀────────────────────────────────────────────────────────────────────────────────────┘
//!
//!     lifecycle: Created → Running → ShuttingDown → Closed
//!                           ▲ SIGTERM / SIGINT / SIGQUIT
//! ```
//!
//! Serves the built-in `/health` route plus a small echo API.

use std::path::PathBuf;

use axum::{body::Bytes, routing::post, Router};
use clap::Parser;

use httpserver::config::{load_config, ServerConfig};
use httpserver::http::HttpServer;
use httpserver::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "httpserver")]
#[command(about = "HTTP server with request/response access logging", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    init_logging(&config.observability)?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        service = %config.service.name,
        daemon = config.lifecycle.daemon,
        shutdown_timeout_secs = config.lifecycle.shutdown_timeout_secs,
        "Configuration loaded"
    );

    let server = HttpServer::builder(config)
        .merge(Router::new().route("/echo", post(echo)))
        .build();

    server.run_with_signals().await?;
    server.wait().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn echo(body: Bytes) -> Bytes {
    body
}
