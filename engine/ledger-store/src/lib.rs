//! LedgerStore - durable record of loyalty orders, balances and withdrawals
//!
//! This crate owns every write to order, balance and withdrawal state. It provides
//! the order state machine, the Luhn checksum used to screen order numbers, the
//! [`LedgerStore`] repository trait and two implementations of it: a Postgres
//! store for production and an in-memory store for local runs and tests.

pub mod balance;
pub mod checksum;
pub mod config;
pub mod error;
pub mod memory;
pub mod order;
pub mod postgres;
pub mod store;
pub mod withdrawal;

pub use balance::Balance;
pub use config::{DatabaseConfig, LedgerConfig};
pub use error::LedgerError;
pub use memory::MemoryLedgerStore;
pub use order::{Order, OrderStatus, Resolution, Transition};
pub use postgres::PgLedgerStore;
pub use store::{LedgerStore, ResolutionOutcome, SubmitOutcome, UserOutcome, WithdrawalOutcome};
pub use withdrawal::Withdrawal;

// Result type alias
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_creation() {
        let balance = Balance::new(100.0);
        assert_eq!(balance.current, 100.0);
        assert_eq!(balance.withdrawn, 0.0);
    }

    #[test]
    fn test_status_round_trips_through_text() {
        let status: OrderStatus = "PROCESSING".parse().unwrap();
        assert_eq!(status, OrderStatus::Processing);
        assert_eq!(status.to_string(), "PROCESSING");
    }
}
