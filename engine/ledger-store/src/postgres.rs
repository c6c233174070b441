//! Postgres LedgerStore
//!
//! Each operation runs in its own transaction. Rows that a write depends on are
//! locked with `SELECT ... FOR UPDATE` first, and every update checks how many
//! rows it touched.

use crate::balance::{validate_withdrawal_amount, Balance};
use crate::config::LedgerConfig;
use crate::order::{transition, Order, OrderStatus, Resolution, Transition};
use crate::store::{LedgerStore, ResolutionOutcome, SubmitOutcome, UserOutcome, WithdrawalOutcome};
use crate::withdrawal::Withdrawal;
use crate::{LedgerError, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::{debug, info};

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    number: String,
    login: String,
    status: String,
    accrual: Option<f64>,
    uploaded_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = LedgerError;

    fn try_from(row: OrderRow) -> Result<Self> {
        Ok(Order {
            number: row.number,
            login: row.login,
            status: row.status.parse()?,
            accrual: row.accrual,
            uploaded_at: row.uploaded_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WithdrawalRow {
    number: String,
    login: String,
    amount: f64,
    processed_at: DateTime<Utc>,
}

impl From<WithdrawalRow> for Withdrawal {
    fn from(row: WithdrawalRow) -> Self {
        Withdrawal {
            number: row.number,
            login: row.login,
            amount: row.amount,
            processed_at: row.processed_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BalanceRow {
    current: f64,
    withdrawn: f64,
}

impl From<BalanceRow> for Balance {
    fn from(row: BalanceRow) -> Self {
        Balance { current: row.current, withdrawn: row.withdrawn }
    }
}

const ORDER_COLUMNS: &str = "number, login, status, accrual, uploaded_at, updated_at";

fn expect_rows(operation: &'static str, expected: u64, actual: u64) -> Result<()> {
    if actual != expected {
        return Err(LedgerError::UnexpectedRowCount { operation, expected, actual });
    }
    Ok(())
}

/// LedgerStore backed by Postgres
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
    starting_balance: f64,
}

impl PgLedgerStore {
    /// Connect to the configured database and bring the schema up to date
    pub async fn connect(config: &LedgerConfig) -> Result<Self> {
        config.validate()?;

        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.database.url)
            .await?;

        let store = Self::from_pool(pool, config.starting_balance);
        store.migrate().await?;

        info!(
            "Ledger store connected (max_connections={})",
            config.database.max_connections
        );
        Ok(store)
    }

    /// Wrap an existing pool without running migrations
    pub fn from_pool(pool: PgPool, starting_balance: f64) -> Self {
        Self { pool, starting_balance }
    }

    /// Apply pending migrations. Safe to run against an existing schema.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Close the pool, waiting for checked out connections to come back
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn lock_balance(
        tx: &mut Transaction<'_, Postgres>,
        login: &str,
    ) -> Result<Balance> {
        let row = sqlx::query_as::<_, BalanceRow>(
            "SELECT current, withdrawn FROM balances WHERE login = $1 FOR UPDATE",
        )
        .bind(login)
        .fetch_optional(&mut **tx)
        .await?;

        row.map(Balance::from)
            .ok_or_else(|| LedgerError::BalanceNotFound { login: login.to_string() })
    }

    async fn write_balance(
        tx: &mut Transaction<'_, Postgres>,
        login: &str,
        balance: Balance,
    ) -> Result<()> {
        let result =
            sqlx::query("UPDATE balances SET current = $2, withdrawn = $3 WHERE login = $1")
                .bind(login)
                .bind(balance.current)
                .bind(balance.withdrawn)
                .execute(&mut **tx)
                .await?;

        expect_rows("update balance", 1, result.rows_affected())
    }
}

#[async_trait::async_trait]
impl LedgerStore for PgLedgerStore {
    async fn create_user(&self, login: &str, password_hash: &str) -> Result<UserOutcome> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO users (login, password_hash) VALUES ($1, $2) ON CONFLICT (login) DO NOTHING",
        )
        .bind(login)
        .bind(password_hash)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            return Ok(UserOutcome::AlreadyExists);
        }

        let result =
            sqlx::query("INSERT INTO balances (login, current, withdrawn) VALUES ($1, $2, 0)")
                .bind(login)
                .bind(self.starting_balance)
                .execute(&mut *tx)
                .await?;
        expect_rows("insert balance", 1, result.rows_affected())?;

        tx.commit().await?;
        debug!("Created user {}", login);
        Ok(UserOutcome::Created)
    }

    async fn password_hash(&self, login: &str) -> Result<Option<String>> {
        let hash = sqlx::query_scalar::<_, String>("SELECT password_hash FROM users WHERE login = $1")
            .bind(login)
            .fetch_optional(&self.pool)
            .await?;
        Ok(hash)
    }

    async fn submit_order(&self, number: &str, login: &str) -> Result<SubmitOutcome> {
        let now = Utc::now();
        let inserted = sqlx::query(
            "INSERT INTO orders (number, login, status, accrual, uploaded_at, updated_at) \
             VALUES ($1, $2, $3, NULL, $4, $4) ON CONFLICT (number) DO NOTHING",
        )
        .bind(number)
        .bind(login)
        .bind(OrderStatus::New.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            return Ok(SubmitOutcome::Created);
        }

        let owner = sqlx::query_scalar::<_, String>("SELECT login FROM orders WHERE number = $1")
            .bind(number)
            .fetch_one(&self.pool)
            .await?;

        Ok(if owner == login {
            SubmitOutcome::AlreadyOwnedBySelf
        } else {
            SubmitOutcome::OwnedByOther
        })
    }

    async fn list_unresolved_orders(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE status IN ('NEW', 'PROCESSING') ORDER BY seq",
            ORDER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn apply_resolution(
        &self,
        number: &str,
        resolution: Resolution,
    ) -> Result<ResolutionOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, (String, String)>(
            "SELECT login, status FROM orders WHERE number = $1 FOR UPDATE",
        )
        .bind(number)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((login, status)) = row else {
            return Ok(ResolutionOutcome::NotFound);
        };

        let current: OrderStatus = status.parse()?;
        if transition(current, resolution.status()) != Transition::Applied {
            return Ok(ResolutionOutcome::NoOp);
        }

        let result = sqlx::query(
            "UPDATE orders SET status = $2, accrual = $3, updated_at = NOW() WHERE number = $1",
        )
        .bind(number)
        .bind(resolution.status().as_str())
        .bind(resolution.credit())
        .execute(&mut *tx)
        .await?;
        expect_rows("update order status", 1, result.rows_affected())?;

        if let Some(accrual) = resolution.credit() {
            let balance = Self::lock_balance(&mut tx, &login).await?;
            Self::write_balance(&mut tx, &login, balance.credited(accrual)?).await?;
        }

        tx.commit().await?;
        debug!("Order {} moved {} -> {}", number, current, resolution.status());
        Ok(ResolutionOutcome::Applied)
    }

    async fn record_withdrawal(
        &self,
        number: &str,
        login: &str,
        amount: f64,
    ) -> Result<WithdrawalOutcome> {
        validate_withdrawal_amount(amount)?;
        let mut tx = self.pool.begin().await?;

        // Serializes withdrawals of the same user
        let balance = Self::lock_balance(&mut tx, login).await?;

        let inserted = sqlx::query(
            "INSERT INTO withdrawals (number, login, amount, processed_at) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (number) DO NOTHING",
        )
        .bind(number)
        .bind(login)
        .bind(amount)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            let owner =
                sqlx::query_scalar::<_, String>("SELECT login FROM withdrawals WHERE number = $1")
                    .bind(number)
                    .fetch_one(&mut *tx)
                    .await?;

            return Ok(if owner == login {
                WithdrawalOutcome::AlreadyOwnedBySelf
            } else {
                WithdrawalOutcome::OwnedByOther
            });
        }

        // Dropping the transaction discards the inserted row
        let Some(debited) = balance.debited(amount)? else {
            return Ok(WithdrawalOutcome::InsufficientFunds);
        };

        Self::write_balance(&mut tx, login, debited).await?;
        tx.commit().await?;

        debug!("Withdrawal {} of {} by {}", number, amount, login);
        Ok(WithdrawalOutcome::Applied)
    }

    async fn get_balance(&self, login: &str) -> Result<Balance> {
        let row = sqlx::query_as::<_, BalanceRow>(
            "SELECT current, withdrawn FROM balances WHERE login = $1",
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Balance::from)
            .ok_or_else(|| LedgerError::BalanceNotFound { login: login.to_string() })
    }

    async fn get_orders(&self, login: &str) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE login = $1 ORDER BY seq",
            ORDER_COLUMNS
        ))
        .bind(login)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn get_withdrawals(&self, login: &str) -> Result<Vec<Withdrawal>> {
        let rows = sqlx::query_as::<_, WithdrawalRow>(
            "SELECT number, login, amount, processed_at FROM withdrawals \
             WHERE login = $1 ORDER BY seq",
        )
        .bind(login)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Withdrawal::from).collect())
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// These need a live database:
//   DATABASE_URL=postgres://... cargo test -p ledger-store -- --ignored
#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum;
    use crate::config::DatabaseConfig;
    use std::sync::Arc;

    async fn test_store(starting_balance: f64) -> PgLedgerStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let config = LedgerConfig {
            database: DatabaseConfig {
                url,
                max_connections: 8,
                min_connections: 1,
                acquire_timeout_secs: 5,
            },
            starting_balance,
        };
        PgLedgerStore::connect(&config).await.unwrap()
    }

    // Unique per call so repeated runs never collide
    fn unique(prefix: &str) -> String {
        format!("{}-{}", prefix, Utc::now().timestamp_nanos_opt().unwrap())
    }

    fn unique_order_number() -> String {
        let payload = Utc::now().timestamp_nanos_opt().unwrap().to_string();
        let digit = checksum::check_digit(&payload).unwrap();
        format!("{}{}", payload, digit)
    }

    #[tokio::test]
    #[ignore]
    async fn test_pg_order_lifecycle() {
        let store = test_store(0.0).await;
        let alice = unique("alice");
        let bob = unique("bob");
        store.create_user(&alice, "hash").await.unwrap();
        store.create_user(&bob, "hash").await.unwrap();
        assert_eq!(store.create_user(&alice, "hash").await.unwrap(), UserOutcome::AlreadyExists);

        let number = unique_order_number();
        assert_eq!(store.submit_order(&number, &alice).await.unwrap(), SubmitOutcome::Created);
        assert_eq!(store.submit_order(&number, &bob).await.unwrap(), SubmitOutcome::OwnedByOther);
        assert_eq!(
            store.submit_order(&number, &alice).await.unwrap(),
            SubmitOutcome::AlreadyOwnedBySelf
        );

        let processed = Resolution::Processed { accrual: 500.0 };
        assert_eq!(
            store.apply_resolution(&number, processed).await.unwrap(),
            ResolutionOutcome::Applied
        );
        assert_eq!(
            store.apply_resolution(&number, processed).await.unwrap(),
            ResolutionOutcome::NoOp
        );
        assert_eq!(store.get_balance(&alice).await.unwrap(), Balance::new(500.0));

        let orders = store.get_orders(&alice).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Processed);
        assert_eq!(orders[0].accrual, Some(500.0));
    }

    #[tokio::test]
    #[ignore]
    async fn test_pg_withdrawals() {
        let store = test_store(0.0).await;
        let alice = unique("alice");
        store.create_user(&alice, "hash").await.unwrap();

        let number = unique_order_number();
        store.submit_order(&number, &alice).await.unwrap();
        store.apply_resolution(&number, Resolution::Processed { accrual: 500.0 }).await.unwrap();

        let first = unique("request");
        assert_eq!(
            store.record_withdrawal(&first, &alice, 200.0).await.unwrap(),
            WithdrawalOutcome::Applied
        );
        assert_eq!(
            store.record_withdrawal(&first, &alice, 200.0).await.unwrap(),
            WithdrawalOutcome::AlreadyOwnedBySelf
        );
        assert_eq!(
            store.record_withdrawal(&unique("request"), &alice, 400.0).await.unwrap(),
            WithdrawalOutcome::InsufficientFunds
        );

        assert_eq!(
            store.get_balance(&alice).await.unwrap(),
            Balance { current: 300.0, withdrawn: 200.0 }
        );
        assert_eq!(store.get_withdrawals(&alice).await.unwrap().len(), 1);
    }

    #[tokio::test]
    #[ignore]
    async fn test_pg_racing_withdrawals_never_overdraw() {
        let store = Arc::new(test_store(1000.0).await);
        let alice = unique("alice");
        store.create_user(&alice, "hash").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            let alice = alice.clone();
            let number = format!("{}-{}", unique("w"), i);
            handles.push(tokio::spawn(async move {
                store.record_withdrawal(&number, &alice, 70.0).await
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() == WithdrawalOutcome::Applied {
                applied += 1;
            }
        }

        let balance = store.get_balance(&alice).await.unwrap();
        assert_eq!(applied, 14);
        assert!(balance.current >= 0.0);
        assert_eq!(balance.current + balance.withdrawn, 1000.0);
    }

    #[tokio::test]
    #[ignore]
    async fn test_pg_migrations_rerun_cleanly() {
        let store = test_store(0.0).await;
        store.migrate().await.unwrap();
        store.health_check().await.unwrap();
    }
}
