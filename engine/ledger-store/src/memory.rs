//! In-memory LedgerStore
//!
//! Holds the whole ledger behind one async mutex, so every operation is
//! trivially atomic and serialized. Used when the service runs without a
//! database and as the store behind the poller and gateway tests.

use crate::balance::{validate_withdrawal_amount, Balance};
use crate::order::{Order, Resolution};
use crate::store::{LedgerStore, ResolutionOutcome, SubmitOutcome, UserOutcome, WithdrawalOutcome};
use crate::withdrawal::Withdrawal;
use crate::{LedgerError, Result};
use std::collections::HashMap;
#[cfg(any(test, feature = "test-util"))]
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct LedgerState {
    users: HashMap<String, String>,
    balances: HashMap<String, Balance>,
    orders: Vec<Order>,
    order_index: HashMap<String, usize>,
    withdrawals: Vec<Withdrawal>,
    withdrawal_index: HashMap<String, usize>,
}

/// LedgerStore kept entirely in process memory
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    state: Mutex<LedgerState>,
    starting_balance: f64,
    #[cfg(any(test, feature = "test-util"))]
    balance_writes_fail: AtomicBool,
}

impl MemoryLedgerStore {
    /// Create an empty store where new users start at zero points
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store where new users start at `starting_balance`
    pub fn with_starting_balance(starting_balance: f64) -> Self {
        Self { starting_balance, ..Self::default() }
    }

    /// Make every balance write fail until switched off again. Writes staged
    /// earlier in the same operation are discarded, like a rolled back
    /// transaction. Only built with the `test-util` feature.
    #[cfg(any(test, feature = "test-util"))]
    pub fn fail_balance_writes(&self, fail: bool) {
        self.balance_writes_fail.store(fail, Ordering::SeqCst);
    }

    #[cfg(any(test, feature = "test-util"))]
    fn check_balance_write(&self, login: &str) -> Result<()> {
        if self.balance_writes_fail.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable {
                message: format!("balance write for {} failed", login),
            });
        }
        Ok(())
    }

    #[cfg(not(any(test, feature = "test-util")))]
    #[inline(always)]
    fn check_balance_write(&self, _login: &str) -> Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<UserOutcome> {
        let mut state = self.state.lock().await;

        if state.users.contains_key(login) {
            return Ok(UserOutcome::AlreadyExists);
        }

        self.check_balance_write(login)?;
        state.users.insert(login.to_string(), password_hash.to_string());
        state.balances.insert(login.to_string(), Balance::new(self.starting_balance));

        Ok(UserOutcome::Created)
    }

    async fn password_hash(&self, login: &str) -> Result<Option<String>> {
        let state = self.state.lock().await;
        Ok(state.users.get(login).cloned())
    }

    async fn submit_order(&self, number: &str, login: &str) -> Result<SubmitOutcome> {
        let mut state = self.state.lock().await;

        if let Some(&idx) = state.order_index.get(number) {
            return Ok(if state.orders[idx].login == login {
                SubmitOutcome::AlreadyOwnedBySelf
            } else {
                SubmitOutcome::OwnedByOther
            });
        }

        let idx = state.orders.len();
        state.orders.push(Order::new(number, login));
        state.order_index.insert(number.to_string(), idx);

        Ok(SubmitOutcome::Created)
    }

    async fn list_unresolved_orders(&self) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        Ok(state.orders.iter().filter(|o| o.is_unresolved()).cloned().collect())
    }

    async fn apply_resolution(
        &self,
        number: &str,
        resolution: Resolution,
    ) -> Result<ResolutionOutcome> {
        let mut state = self.state.lock().await;

        let Some(&idx) = state.order_index.get(number) else {
            return Ok(ResolutionOutcome::NotFound);
        };

        let Some(resolved) = state.orders[idx].resolved(resolution) else {
            return Ok(ResolutionOutcome::NoOp);
        };

        // Stage the credit before touching anything so a failure leaves no trace
        let credited = match resolution.credit() {
            Some(accrual) => {
                self.check_balance_write(&resolved.login)?;
                let balance = state.balances.get(&resolved.login).copied().ok_or_else(|| {
                    LedgerError::BalanceNotFound { login: resolved.login.clone() }
                })?;
                Some(balance.credited(accrual)?)
            }
            None => None,
        };

        if let Some(balance) = credited {
            state.balances.insert(resolved.login.clone(), balance);
        }
        state.orders[idx] = resolved;

        Ok(ResolutionOutcome::Applied)
    }

    async fn record_withdrawal(
        &self,
        number: &str,
        login: &str,
        amount: f64,
    ) -> Result<WithdrawalOutcome> {
        validate_withdrawal_amount(amount)?;
        let mut state = self.state.lock().await;

        if let Some(&idx) = state.withdrawal_index.get(number) {
            return Ok(if state.withdrawals[idx].login == login {
                WithdrawalOutcome::AlreadyOwnedBySelf
            } else {
                WithdrawalOutcome::OwnedByOther
            });
        }

        let balance = state
            .balances
            .get(login)
            .copied()
            .ok_or_else(|| LedgerError::BalanceNotFound { login: login.to_string() })?;

        let Some(debited) = balance.debited(amount)? else {
            return Ok(WithdrawalOutcome::InsufficientFunds);
        };

        self.check_balance_write(login)?;
        state.balances.insert(login.to_string(), debited);
        let idx = state.withdrawals.len();
        state.withdrawals.push(Withdrawal::new(number, login, amount));
        state.withdrawal_index.insert(number.to_string(), idx);

        Ok(WithdrawalOutcome::Applied)
    }

    async fn get_balance(&self, login: &str) -> Result<Balance> {
        let state = self.state.lock().await;
        state
            .balances
            .get(login)
            .copied()
            .ok_or_else(|| LedgerError::BalanceNotFound { login: login.to_string() })
    }

    async fn get_orders(&self, login: &str) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        Ok(state.orders.iter().filter(|o| o.login == login).cloned().collect())
    }

    async fn get_withdrawals(&self, login: &str) -> Result<Vec<Withdrawal>> {
        let state = self.state.lock().await;
        Ok(state.withdrawals.iter().filter(|w| w.login == login).cloned().collect())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderStatus;
    use std::sync::Arc;

    const ORDER: &str = "12345678903";

    async fn store_with(logins: &[&str]) -> MemoryLedgerStore {
        let store = MemoryLedgerStore::new();
        for login in logins {
            assert_eq!(store.create_user(login, "hash").await.unwrap(), UserOutcome::Created);
        }
        store
    }

    #[tokio::test]
    async fn test_alice_end_to_end() {
        let store = store_with(&["alice"]).await;

        assert_eq!(store.submit_order(ORDER, "alice").await.unwrap(), SubmitOutcome::Created);
        assert_eq!(
            store.apply_resolution(ORDER, Resolution::Processed { accrual: 500.0 }).await.unwrap(),
            ResolutionOutcome::Applied
        );
        assert_eq!(store.get_balance("alice").await.unwrap(), Balance::new(500.0));

        assert_eq!(
            store.record_withdrawal("request-1", "alice", 200.0).await.unwrap(),
            WithdrawalOutcome::Applied
        );
        assert_eq!(
            store.get_balance("alice").await.unwrap(),
            Balance { current: 300.0, withdrawn: 200.0 }
        );

        assert_eq!(
            store.record_withdrawal("request-2", "alice", 400.0).await.unwrap(),
            WithdrawalOutcome::InsufficientFunds
        );
        assert_eq!(
            store.get_balance("alice").await.unwrap(),
            Balance { current: 300.0, withdrawn: 200.0 }
        );
        assert_eq!(store.get_withdrawals("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_order_ownership() {
        let store = store_with(&["alice", "bob"]).await;

        assert_eq!(store.submit_order(ORDER, "alice").await.unwrap(), SubmitOutcome::Created);
        assert_eq!(store.submit_order(ORDER, "bob").await.unwrap(), SubmitOutcome::OwnedByOther);
        assert_eq!(
            store.submit_order(ORDER, "alice").await.unwrap(),
            SubmitOutcome::AlreadyOwnedBySelf
        );

        let orders = store.get_orders("alice").await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::New);
        assert!(store.get_orders("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_terminal_resolution_credits_once() {
        let store = store_with(&["alice"]).await;
        store.submit_order(ORDER, "alice").await.unwrap();

        let processed = Resolution::Processed { accrual: 500.0 };
        assert_eq!(
            store.apply_resolution(ORDER, processed).await.unwrap(),
            ResolutionOutcome::Applied
        );
        assert_eq!(
            store.apply_resolution(ORDER, processed).await.unwrap(),
            ResolutionOutcome::NoOp
        );
        assert_eq!(
            store.apply_resolution(ORDER, Resolution::Invalid).await.unwrap(),
            ResolutionOutcome::NoOp
        );

        assert_eq!(store.get_balance("alice").await.unwrap().current, 500.0);
        assert!(store.list_unresolved_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_processing_then_processed() {
        let store = store_with(&["alice"]).await;
        store.submit_order(ORDER, "alice").await.unwrap();

        store.apply_resolution(ORDER, Resolution::Processing).await.unwrap();
        let unresolved = store.list_unresolved_orders().await.unwrap();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].status, OrderStatus::Processing);
        assert_eq!(unresolved[0].accrual, None);
        assert_eq!(store.get_balance("alice").await.unwrap().current, 0.0);

        store.apply_resolution(ORDER, Resolution::Processed { accrual: 42.5 }).await.unwrap();
        let orders = store.get_orders("alice").await.unwrap();
        assert_eq!(orders[0].accrual, Some(42.5));
        assert_eq!(store.get_balance("alice").await.unwrap().current, 42.5);
    }

    #[tokio::test]
    async fn test_unknown_order_resolution() {
        let store = store_with(&["alice"]).await;
        assert_eq!(
            store.apply_resolution("79927398713", Resolution::Invalid).await.unwrap(),
            ResolutionOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_failed_credit_rolls_back_status() {
        let store = store_with(&["alice"]).await;
        store.submit_order(ORDER, "alice").await.unwrap();

        store.fail_balance_writes(true);
        let result = store.apply_resolution(ORDER, Resolution::Processed { accrual: 500.0 }).await;
        assert!(matches!(result, Err(LedgerError::Unavailable { .. })));

        // neither the status nor the balance moved
        let orders = store.get_orders("alice").await.unwrap();
        assert_eq!(orders[0].status, OrderStatus::New);
        assert_eq!(orders[0].accrual, None);
        assert_eq!(store.get_balance("alice").await.unwrap().current, 0.0);

        // the next attempt goes through
        store.fail_balance_writes(false);
        assert_eq!(
            store.apply_resolution(ORDER, Resolution::Processed { accrual: 500.0 }).await.unwrap(),
            ResolutionOutcome::Applied
        );
        assert_eq!(store.get_balance("alice").await.unwrap().current, 500.0);
    }

    #[tokio::test]
    async fn test_failed_debit_leaves_no_withdrawal() {
        let store = MemoryLedgerStore::with_starting_balance(100.0);
        store.create_user("alice", "hash").await.unwrap();

        store.fail_balance_writes(true);
        assert!(store.record_withdrawal("request-1", "alice", 10.0).await.is_err());
        store.fail_balance_writes(false);

        assert!(store.get_withdrawals("alice").await.unwrap().is_empty());
        assert_eq!(store.get_balance("alice").await.unwrap(), Balance::new(100.0));
        // the number was not burnt by the failed attempt
        assert_eq!(
            store.record_withdrawal("request-1", "alice", 10.0).await.unwrap(),
            WithdrawalOutcome::Applied
        );
    }

    #[tokio::test]
    async fn test_withdrawal_number_ownership() {
        let store = MemoryLedgerStore::with_starting_balance(100.0);
        store.create_user("alice", "hash").await.unwrap();
        store.create_user("bob", "hash").await.unwrap();

        assert_eq!(
            store.record_withdrawal("request-1", "alice", 10.0).await.unwrap(),
            WithdrawalOutcome::Applied
        );
        assert_eq!(
            store.record_withdrawal("request-1", "alice", 10.0).await.unwrap(),
            WithdrawalOutcome::AlreadyOwnedBySelf
        );
        assert_eq!(
            store.record_withdrawal("request-1", "bob", 10.0).await.unwrap(),
            WithdrawalOutcome::OwnedByOther
        );
        assert_eq!(store.get_balance("alice").await.unwrap().current, 90.0);
        assert_eq!(store.get_balance("bob").await.unwrap().current, 100.0);
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let store = store_with(&["alice"]).await;
        assert_eq!(
            store.create_user("alice", "other").await.unwrap(),
            UserOutcome::AlreadyExists
        );
        assert_eq!(store.password_hash("alice").await.unwrap().as_deref(), Some("hash"));
        assert_eq!(store.password_hash("nobody").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_have_one_winner() {
        let logins: Vec<String> = (0..16).map(|i| format!("user{}", i)).collect();
        let store = Arc::new(MemoryLedgerStore::new());
        for login in &logins {
            store.create_user(login, "hash").await.unwrap();
        }

        let mut handles = Vec::new();
        for login in logins.clone() {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.submit_order(ORDER, &login).await }));
        }

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                SubmitOutcome::Created => created += 1,
                SubmitOutcome::OwnedByOther => {}
                SubmitOutcome::AlreadyOwnedBySelf => panic!("each login submitted once"),
            }
        }
        assert_eq!(created, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_withdrawals_never_overdraw() {
        let store = Arc::new(MemoryLedgerStore::with_starting_balance(1000.0));
        store.create_user("alice", "hash").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.record_withdrawal(&format!("w{}", i), "alice", 70.0).await
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() == WithdrawalOutcome::Applied {
                applied += 1;
            }
        }

        let balance = store.get_balance("alice").await.unwrap();
        assert_eq!(applied, 14);
        assert!(balance.current >= 0.0);
        assert_eq!(balance.withdrawn, 70.0 * applied as f64);
        assert_eq!(balance.current + balance.withdrawn, 1000.0);
    }
}
