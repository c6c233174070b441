//! Service state management and component wiring

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::signals::graceful_shutdown;
use accrual_poller::{AccrualPoller, HttpAccrualClient};
use ledger_store::{LedgerStore, MemoryLedgerStore, PgLedgerStore};
use loyalty_gateway::LoyaltyGateway;

/// Service state containing all initialized components
pub struct ServiceState {
    /// Service configuration
    pub config: ServiceConfig,

    /// Ledger shared by the gateway and the poller
    pub ledger: Arc<dyn LedgerStore>,

    /// Postgres handle, kept to close the pool on shutdown
    postgres: Option<Arc<PgLedgerStore>>,
}

impl ServiceState {
    /// Connect the ledger and run migrations
    pub async fn new(config: ServiceConfig) -> Result<Self> {
        info!("Initializing service components...");

        if config.service.persistent {
            info!("Connecting to Postgres ledger...");
            let store = Arc::new(
                PgLedgerStore::connect(&config.ledger)
                    .await
                    .context("Failed to connect the Postgres ledger")?,
            );
            info!("Postgres ledger ready");

            let ledger: Arc<dyn LedgerStore> = store.clone();
            return Ok(Self { config, ledger, postgres: Some(store) });
        }

        warn!("No database configured, ledger is kept in memory and lost on exit");
        let ledger: Arc<dyn LedgerStore> =
            Arc::new(MemoryLedgerStore::with_starting_balance(config.ledger.starting_balance));
        Ok(Self { config, ledger, postgres: None })
    }

    /// Build a service around an existing ledger
    pub fn with_ledger(config: ServiceConfig, ledger: Arc<dyn LedgerStore>) -> Self {
        Self { config, ledger, postgres: None }
    }

    /// Start polling the accrual authority in the background
    pub fn start_accrual_poller(&self, shutdown: watch::Receiver<bool>) -> Result<JoinHandle<()>> {
        let source = HttpAccrualClient::new(&self.config.poller)
            .context("Failed to build the accrual client")?;
        let poller = AccrualPoller::new(self.ledger.clone(), Arc::new(source), self.config.poller.clone());

        Ok(tokio::spawn(async move { poller.run(shutdown).await }))
    }

    /// Serve the API and run the background tasks until `shutdown` flips
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let gateway = LoyaltyGateway::new(self.config.gateway.clone(), self.ledger.clone());

        // bind before spawning anything so a taken port fails fast
        let (addr, server) = gateway.bind(shutdown.clone()).context("Failed to start LoyaltyGateway")?;
        info!("LoyaltyGateway listening on {}", addr);

        let poller = self.start_accrual_poller(shutdown.clone())?;
        let sweeper = gateway.spawn_sweeper(shutdown);

        info!("Loyalty service is running. Press Ctrl+C to shutdown gracefully.");
        server.await;

        info!("Shutdown signal received. Stopping background tasks...");
        let limit = Duration::from_secs(self.config.service.shutdown_timeout_secs);
        graceful_shutdown(vec![("AccrualPoller", poller), ("SessionSweeper", sweeper)], limit).await;

        self.shutdown().await;
        Ok(())
    }

    /// Release the database pool
    pub async fn shutdown(&self) {
        if let Some(store) = &self.postgres {
            store.close().await;
            info!("Postgres pool closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from;

    #[tokio::test]
    async fn test_memory_ledger_without_database() {
        let config = load_config_from(["loyalty-service", "--starting-balance", "10"]).unwrap();
        let state = ServiceState::new(config).await.unwrap();

        let outcome = state.ledger.create_user("alice", "salt$hash").await.unwrap();
        assert_eq!(outcome, ledger_store::UserOutcome::Created);
        assert_eq!(state.ledger.get_balance("alice").await.unwrap().current, 10.0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let config = load_config_from([
            "loyalty-service",
            "-a",
            "127.0.0.1:0",
            "-r",
            "http://127.0.0.1:9",
            "--shutdown-timeout-secs",
            "5",
        ])
        .unwrap();
        let state = Arc::new(ServiceState::with_ledger(config, Arc::new(MemoryLedgerStore::new())));
        let (tx, rx) = watch::channel(false);

        let handle = {
            let state = state.clone();
            tokio::spawn(async move { state.run(rx).await })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(10), handle).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_run_fails_when_address_is_bad() {
        let mut config = load_config_from(["loyalty-service"]).unwrap();
        config.gateway.server.address = "not an address".to_string();
        let state = ServiceState::with_ledger(config, Arc::new(MemoryLedgerStore::new()));
        let (_tx, rx) = watch::channel(false);

        assert!(state.run(rx).await.is_err());
    }
}
