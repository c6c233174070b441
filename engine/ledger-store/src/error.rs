//! Error types for LedgerStore

use thiserror::Error;

/// Failures of a ledger operation.
///
/// Conflicts and insufficient funds are not errors: they are ordinary outcome
/// variants (see [`crate::store`]). An `Err` always means the unit of work was
/// rolled back and may be retried by the caller.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Unexpected row count in {operation}: expected {expected}, affected {actual}")]
    UnexpectedRowCount { operation: &'static str, expected: u64, actual: u64 },

    #[error("Balance not found for login: {login}")]
    BalanceNotFound { login: String },

    #[error("Invalid amount: {amount}")]
    InvalidAmount { amount: f64 },

    #[error("Corrupt record: {message}")]
    CorruptRecord { message: String },

    #[error("Storage unavailable: {message}")]
    Unavailable { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}
