//! Loyalty Service Library
//!
//! Configuration loading, logging setup, signal handling and the wiring that
//! runs the LoyaltyGateway and the AccrualPoller against one ledger.

use anyhow::{Context, Result};

pub mod config;
pub mod logging;
pub mod service;
pub mod signals;

pub use config::ServiceConfig;
pub use logging::initialize_logging;
pub use service::ServiceState;
pub use signals::{graceful_shutdown, setup_signal_handlers};

/// Load configuration from `.env`, the environment and the command line
pub fn load_configuration() -> Result<ServiceConfig> {
    config::load_config().context("Failed to load service configuration")
}
