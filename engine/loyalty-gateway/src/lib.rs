//! LoyaltyGateway - REST API for the loyalty points system
//!
//! Users register and log in, upload order numbers, read their balance and
//! spend points. Session tokens travel in the `Authorization` header or the
//! `AuthToken` cookie and expire after a stretch of inactivity.

pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod rest_api;
pub mod session;

pub use config::{GatewayConfig, ServerConfig, SessionConfig};
pub use error::{ApiError, GatewayError, GatewayResult};
pub use gateway::LoyaltyGateway;
pub use session::SessionCache;
