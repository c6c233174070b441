//! Configuration for the LoyaltyGateway

use crate::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

/// Main configuration for the LoyaltyGateway
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Session configuration
    pub session: SessionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// `host:port` to listen on
    pub address: String,

    /// Largest request body accepted
    pub body_limit_bytes: u64,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sweeps a session survives without being used
    pub ttl_units: u32,

    /// Seconds between two sweeps
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { address: "localhost:8080".to_string(), body_limit_bytes: 16 * 1024 }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_units: 60, sweep_interval_secs: 60 }
    }
}

impl SessionConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl GatewayConfig {
    /// Resolve the listen address
    pub fn server_addr(&self) -> GatewayResult<SocketAddr> {
        self.server
            .address
            .to_socket_addrs()
            .map_err(|e| GatewayError::Config(format!("bad address {}: {}", self.server.address, e)))?
            .next()
            .ok_or_else(|| GatewayError::Config(format!("{} resolves to nothing", self.server.address)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> GatewayResult<()> {
        if self.session.ttl_units == 0 {
            return Err(GatewayError::Config("session ttl must be at least 1".to_string()));
        }
        if self.session.sweep_interval_secs == 0 {
            return Err(GatewayError::Config("sweep interval must be at least 1s".to_string()));
        }
        if self.server.body_limit_bytes == 0 {
            return Err(GatewayError::Config("body limit must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.sweep_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_server_addr() {
        let config = GatewayConfig {
            server: ServerConfig { address: "127.0.0.1:8088".to_string(), ..Default::default() },
            ..Default::default()
        };
        assert_eq!(config.server_addr().unwrap(), "127.0.0.1:8088".parse().unwrap());

        let config = GatewayConfig {
            server: ServerConfig { address: "no port here".to_string(), ..Default::default() },
            ..Default::default()
        };
        assert!(config.server_addr().is_err());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut config = GatewayConfig::default();
        config.session.ttl_units = 0;
        assert!(config.validate().is_err());
    }
}
