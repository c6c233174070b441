//! Service configuration management
//!
//! Every setting comes from a command-line flag that falls back to an
//! environment variable, so `.env` files and container environments work
//! without flags.

use accrual_poller::PollerConfig;
use anyhow::{Context, Result};
use clap::Parser;
use ledger_store::LedgerConfig;
use loyalty_gateway::GatewayConfig;
use serde::{Deserialize, Serialize};

/// Command-line flags
#[derive(Parser, Debug, Clone)]
#[command(name = "loyalty-service", version, about = "Loyalty points service")]
pub struct Args {
    /// Address the HTTP API listens on
    #[arg(short = 'a', long, env = "RUN_ADDRESS", default_value = "localhost:8080")]
    pub run_address: String,

    /// Postgres connection string. Without it the ledger lives in memory.
    #[arg(short = 'd', long, env = "DATABASE_URI")]
    pub database_uri: Option<String>,

    /// Base address of the accrual authority
    #[arg(short = 'r', long, env = "ACCRUAL_SYSTEM_ADDRESS", default_value = "http://localhost:8081")]
    pub accrual_system_address: String,

    /// Seconds between two poll cycles
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 5)]
    pub poll_interval_secs: u64,

    /// Minimum milliseconds between two accrual lookups (0 disables pacing)
    #[arg(long, env = "ACCRUAL_REQUEST_SPACING_MS", default_value_t = 100)]
    pub request_spacing_ms: u64,

    /// Lookups allowed back to back before pacing applies
    #[arg(long, env = "ACCRUAL_BURST", default_value_t = 1)]
    pub accrual_burst: u32,

    /// Accrual lookups outstanding at once
    #[arg(long, env = "ACCRUAL_MAX_IN_FLIGHT", default_value_t = 1)]
    pub max_in_flight: usize,

    /// Milliseconds before a single accrual lookup is given up
    #[arg(long, env = "ACCRUAL_TIMEOUT_MS", default_value_t = 10_000)]
    pub accrual_timeout_ms: u64,

    /// Seconds to back off after the authority answers 429
    #[arg(long, env = "ACCRUAL_COOLDOWN_SECS", default_value_t = 60)]
    pub rate_limit_cooldown_secs: u64,

    /// Sweeps an unused session survives
    #[arg(long, env = "SESSION_TTL", default_value_t = 60)]
    pub session_ttl: u32,

    /// Seconds between two session sweeps
    #[arg(long, env = "SESSION_SWEEP_SECS", default_value_t = 60)]
    pub session_sweep_secs: u64,

    /// Points credited to every new user
    #[arg(long, env = "STARTING_BALANCE", default_value_t = 0.0)]
    pub starting_balance: f64,

    /// Largest database pool
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    pub db_max_connections: u32,

    /// Seconds to wait for background tasks on shutdown
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    pub shutdown_timeout_secs: u64,
}

/// Main service configuration
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    /// LedgerStore configuration
    pub ledger: LedgerConfig,

    /// AccrualPoller configuration
    pub poller: PollerConfig,

    /// LoyaltyGateway configuration
    pub gateway: GatewayConfig,

    /// Service-level configuration
    pub service: ServiceSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Keep the ledger in Postgres rather than in memory
    pub persistent: bool,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_secs: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self { persistent: false, shutdown_timeout_secs: 10 }
    }
}

impl From<Args> for ServiceConfig {
    fn from(args: Args) -> Self {
        let mut config = ServiceConfig::default();

        if let Some(uri) = args.database_uri.filter(|uri| !uri.trim().is_empty()) {
            config.ledger.database.url = uri;
            config.service.persistent = true;
        }
        config.ledger.database.max_connections = args.db_max_connections;
        config.ledger.starting_balance = args.starting_balance;

        config.poller.accrual_address = with_scheme(&args.accrual_system_address);
        config.poller.poll_interval_secs = args.poll_interval_secs;
        config.poller.request_spacing_ms = args.request_spacing_ms;
        config.poller.burst = args.accrual_burst;
        config.poller.max_in_flight = args.max_in_flight;
        config.poller.rate_limit_cooldown_secs = args.rate_limit_cooldown_secs;
        config.poller.request_timeout_ms = args.accrual_timeout_ms;

        config.gateway.server.address = args.run_address;
        config.gateway.session.ttl_units = args.session_ttl;
        config.gateway.session.sweep_interval_secs = args.session_sweep_secs;

        config.service.shutdown_timeout_secs = args.shutdown_timeout_secs;
        config
    }
}

// Bare `host:port` accrual addresses are taken as plain http
fn with_scheme(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

/// Load configuration from `.env`, the environment and the command line
pub fn load_config() -> Result<ServiceConfig> {
    dotenv::dotenv().ok();
    let config = ServiceConfig::from(Args::parse());
    validate_config(&config)?;
    Ok(config)
}

/// Parse an explicit argument list
pub fn load_config_from<I, T>(args: I) -> Result<ServiceConfig>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let args = Args::try_parse_from(args).context("Invalid command line")?;
    let config = ServiceConfig::from(args);
    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration
pub fn validate_config(config: &ServiceConfig) -> Result<()> {
    config.ledger.validate().context("Invalid ledger configuration")?;
    config.poller.validate().context("Invalid poller configuration")?;
    config.gateway.validate().context("Invalid gateway configuration")?;

    if config.service.shutdown_timeout_secs == 0 {
        return Err(anyhow::anyhow!("Shutdown timeout must be at least 1s"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = load_config_from(["loyalty-service"]).unwrap();
        assert_eq!(config.gateway.server.address, "localhost:8080");
        assert_eq!(config.poller.accrual_address, "http://localhost:8081");
        assert_eq!(config.poller.poll_interval_secs, 5);
        assert_eq!(config.gateway.session.ttl_units, 60);
        assert_eq!(config.poller.request_timeout_ms, 10_000);
        assert!(!config.service.persistent);
    }

    #[test]
    fn test_short_flags() {
        let config = load_config_from([
            "loyalty-service",
            "-a",
            "0.0.0.0:9000",
            "-d",
            "postgres://app:pw@db/loyalty",
            "-r",
            "accrual:8081",
        ])
        .unwrap();

        assert_eq!(config.gateway.server.address, "0.0.0.0:9000");
        assert_eq!(config.ledger.database.url, "postgres://app:pw@db/loyalty");
        assert!(config.service.persistent);
        assert_eq!(config.poller.accrual_address, "http://accrual:8081");
    }

    #[test]
    fn test_tuning_flags() {
        let config = load_config_from([
            "loyalty-service",
            "--max-in-flight",
            "4",
            "--accrual-burst",
            "2",
            "--request-spacing-ms",
            "0",
            "--starting-balance",
            "25",
            "--accrual-timeout-ms",
            "2500",
        ])
        .unwrap();

        assert_eq!(config.poller.max_in_flight, 4);
        assert_eq!(config.poller.burst, 2);
        assert_eq!(config.poller.request_spacing_ms, 0);
        assert_eq!(config.ledger.starting_balance, 25.0);
        assert_eq!(config.poller.request_timeout_ms, 2500);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(load_config_from(["loyalty-service", "--poll-interval-secs", "0"]).is_err());
        assert!(load_config_from(["loyalty-service", "--session-ttl", "0"]).is_err());
        assert!(load_config_from(["loyalty-service", "--accrual-timeout-ms", "0"]).is_err());
        assert!(load_config_from(["loyalty-service", "--starting-balance=-1"]).is_err());
        assert!(load_config_from(["loyalty-service", "--bogus"]).is_err());
    }

    #[test]
    fn test_empty_database_uri_means_memory() {
        let config = load_config_from(["loyalty-service", "-d", ""]).unwrap();
        assert!(!config.service.persistent);
    }
}
