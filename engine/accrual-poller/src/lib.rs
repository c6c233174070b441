//! Accrual Poller
//!
//! Reconciles unresolved loyalty orders against the external accrual
//! authority. The poller asks the authority about each `NEW` or `PROCESSING`
//! order, maps its verdict onto the order state machine and hands the result
//! to the ledger, which credits the owner when an order lands on `PROCESSED`.

pub mod client;
pub mod config;
pub mod error;
pub mod limiter;
pub mod mock;
pub mod models;
pub mod poller;

pub use client::{AccrualSource, HttpAccrualClient};
pub use config::PollerConfig;
pub use error::{AccrualError, PollerError};
pub use limiter::RequestLimiter;
pub use models::{AccrualResponse, AccrualStatus};
pub use poller::{AccrualPoller, CycleReport};
