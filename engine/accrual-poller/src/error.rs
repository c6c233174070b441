//! Error types for the accrual poller

use ledger_store::LedgerError;
use thiserror::Error;

/// Failures of a single accrual authority lookup
#[derive(Error, Debug)]
pub enum AccrualError {
    #[error("accrual authority rate limited the request")]
    RateLimited,

    #[error("accrual authority answered {status} for order {order}")]
    UnexpectedStatus { order: String, status: u16 },

    #[error("request for order {order} failed: {source}")]
    Transport {
        order: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("malformed response for order {order}: {message}")]
    Decode { order: String, message: String },

    #[error("asked for order {requested} but the response names {received}")]
    OrderMismatch { requested: String, received: String },

    #[error("order {order} carries an unusable accrual {accrual}")]
    InvalidAccrual { order: String, accrual: f64 },

    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

impl AccrualError {
    /// Check if the lookup ran into the request timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, AccrualError::Transport { source, .. } if source.is_timeout())
    }
}

/// Failures of a poll cycle or of one order within it
#[derive(Error, Debug)]
pub enum PollerError {
    #[error(transparent)]
    Accrual(#[from] AccrualError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl PollerError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, PollerError::Accrual(AccrualError::RateLimited))
    }
}
