//! The ledger repository interface
//!
//! Every method is one atomic unit of work. Conflicts and insufficient funds
//! come back as `Ok` outcome variants callers have to branch on; `Err` means
//! the whole unit was rolled back and the caller may retry later.

use crate::balance::Balance;
use crate::order::{Order, Resolution};
use crate::withdrawal::Withdrawal;
use crate::Result;

/// Result of registering a user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOutcome {
    Created,
    AlreadyExists,
}

/// Result of submitting an order number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Order recorded as `NEW` for the caller
    Created,
    /// The caller submitted this number before; nothing changed
    AlreadyOwnedBySelf,
    /// Another user holds this number
    OwnedByOther,
}

/// Result of applying an accrual authority verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// Status written, and the balance credited if the order was processed
    Applied,
    /// Not a forward transition; nothing written
    NoOp,
    NotFound,
}

/// Result of a withdrawal request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawalOutcome {
    Applied,
    AlreadyOwnedBySelf,
    OwnedByOther,
    InsufficientFunds,
}

/// Sole writer of order, balance and withdrawal state
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    /// Register a user together with their starting balance
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<UserOutcome>;

    /// Stored password hash for a login
    async fn password_hash(&self, login: &str) -> Result<Option<String>>;

    /// Claim an order number for `login`. The number must already have passed
    /// checksum validation.
    async fn submit_order(&self, number: &str, login: &str) -> Result<SubmitOutcome>;

    /// Orders in `NEW` or `PROCESSING`, oldest upload first
    async fn list_unresolved_orders(&self) -> Result<Vec<Order>>;

    /// Move an order forward and credit its owner when it lands on `PROCESSED`
    async fn apply_resolution(&self, number: &str, resolution: Resolution)
        -> Result<ResolutionOutcome>;

    /// Debit `amount` from `login` against a unique withdrawal number
    async fn record_withdrawal(
        &self,
        number: &str,
        login: &str,
        amount: f64,
    ) -> Result<WithdrawalOutcome>;

    /// Current balance of a user
    async fn get_balance(&self, login: &str) -> Result<Balance>;

    /// Orders uploaded by a user, oldest first
    async fn get_orders(&self, login: &str) -> Result<Vec<Order>>;

    /// Withdrawals made by a user, oldest first
    async fn get_withdrawals(&self, login: &str) -> Result<Vec<Withdrawal>>;

    /// Health check
    async fn health_check(&self) -> Result<()>;
}
