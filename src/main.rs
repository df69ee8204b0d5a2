//! ML Gateway
//!
//! Mediates calls from the trust API to external ML inference services.
//!
//! # Architecture Overview
//!
//! ```text
//!     capability call
//!     ───────────────▶ ┌──────────────┐   available?   ┌───────────────┐
//!                      │ orchestrator │ ─────────────▶ │ health checker│ ◀── periodic /health
//!                      └──────┬───────┘                └───────────────┘
//!                             │
//!                             ▼
//!                      ┌──────────────┐   ┌─────────┐   ┌───────────┐
//!                      │circuit breaker│─▶│  retry  │─▶ │ transport │ ────▶ ML service
//!                      └──────┬───────┘   └─────────┘   └───────────┘
//!                             │
//!                             ▼
//!                      ┌──────────────┐
//!     envelope ◀────── │  validator   │
//!                      └──────────────┘
//! ```
//!
//! The binary loads configuration, gates startup on required services,
//! runs the periodic health worker and serves the admin status surface.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use ml_gateway::admin::{self, AppState};
use ml_gateway::config::load_config;
use ml_gateway::lifecycle::{readiness_gate, signals, Shutdown};
use ml_gateway::observability::{logging, metrics};
use ml_gateway::Registry;

#[derive(Parser)]
#[command(name = "ml-gateway")]
#[command(about = "Resilience gateway for ML inference services", long_about = None)]
struct Cli {
    /// TOML configuration file; environment overrides apply on top.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start without waiting for required services.
    #[arg(long)]
    skip_readiness: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init_logging(&config.observability) {
        eprintln!("Failed to initialize logging: {e}");
    }

    match run(config, cli.skip_readiness).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "ml-gateway exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn run(
    config: ml_gateway::GatewayConfig,
    skip_readiness: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        name = %config.gateway.name,
        version = env!("CARGO_PKG_VERSION"),
        services = config.services.len(),
        "ml-gateway starting"
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

    let registry = Arc::new(Registry::from_config(&config)?);

    if skip_readiness {
        tracing::warn!("Skipping readiness probe");
    } else {
        readiness_gate(&registry).await?;
    }
    registry.health().start();

    let shutdown = Shutdown::new();
    let admin_task = if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AppState::new(Arc::clone(&registry));
        let shutdown = shutdown.clone();
        Some(tokio::spawn(async move {
            admin::serve(listener, state, &shutdown).await
        }))
    } else {
        None
    };

    signals::wait_for_signal().await;
    tracing::info!("Shutting down");

    shutdown.trigger();
    registry.health().stop().await;
    if let Some(task) = admin_task {
        match task.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Admin server failed"),
            Err(e) => tracing::error!(error = %e, "Admin server task panicked"),
            Ok(Ok(())) => {}
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
