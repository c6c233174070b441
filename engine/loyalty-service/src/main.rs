//! Loyalty Service
//!
//! Entry point: loads configuration, connects the ledger, then serves the
//! HTTP API and polls the accrual authority until Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use tracing::info;

use loyalty_service::{initialize_logging, load_configuration, setup_signal_handlers, ServiceState};

#[tokio::main]
async fn main() -> Result<()> {
    // LOG_FORMAT may come from .env
    dotenv::dotenv().ok();
    initialize_logging()?;

    info!("Starting Loyalty Service v{}", env!("CARGO_PKG_VERSION"));

    let config = load_configuration()?;
    info!("Configuration loaded successfully");

    let state = ServiceState::new(config).await.context("Failed to initialize service")?;

    let shutdown = setup_signal_handlers()?;
    info!("Signal handlers configured");

    state.run(shutdown).await?;

    info!("Loyalty Service shutdown complete");
    Ok(())
}
