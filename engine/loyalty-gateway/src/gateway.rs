//! Main LoyaltyGateway implementation

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::rest_api::create_routes;
use crate::session::{run_sweeper, SessionCache};

use ledger_store::LedgerStore;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use warp::Filter;

/// HTTP front of the loyalty system
pub struct LoyaltyGateway {
    /// Gateway configuration
    config: GatewayConfig,

    /// Ledger every handler reads and writes through
    ledger: Arc<dyn LedgerStore>,

    /// Issued session tokens
    sessions: Arc<SessionCache>,
}

impl LoyaltyGateway {
    /// Create a new LoyaltyGateway
    pub fn new(config: GatewayConfig, ledger: Arc<dyn LedgerStore>) -> Self {
        let sessions = Arc::new(SessionCache::new(config.session.ttl_units));
        Self { config, ledger, sessions }
    }

    pub fn sessions(&self) -> Arc<SessionCache> {
        self.sessions.clone()
    }

    /// Full route tree
    pub fn routes(&self) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
        create_routes(self.ledger.clone(), self.sessions.clone(), self.config.server.body_limit_bytes)
    }

    /// Start evicting idle sessions in the background
    pub fn spawn_sweeper(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(run_sweeper(self.sessions.clone(), self.config.session.sweep_interval(), shutdown))
    }

    /// Bind the listener. The returned future serves requests until
    /// `shutdown` flips to true, then drains in-flight requests.
    pub fn bind(
        &self,
        mut shutdown: watch::Receiver<bool>,
    ) -> GatewayResult<(SocketAddr, impl Future<Output = ()> + 'static)> {
        let addr = self.config.server_addr()?;

        let stop = async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            info!("LoyaltyGateway shutting down");
        };

        warp::serve(self.routes())
            .try_bind_with_graceful_shutdown(addr, stop)
            .map_err(|e| GatewayError::Bind(format!("{}: {}", addr, e)))
    }

    /// Serve until `shutdown` flips to true
    pub async fn serve(&self, shutdown: watch::Receiver<bool>) -> GatewayResult<()> {
        let (addr, server) = self.bind(shutdown)?;
        info!("LoyaltyGateway listening on {}", addr);
        server.await;
        info!("LoyaltyGateway stopped");
        Ok(())
    }
}
