//! PostgreSQL ledger store implementation

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::error::{LedgerError, Result};
use crate::store::traits::{check_debit, check_verdict, LedgerStore};
use crate::types::{Account, AccountId, Order, OrderDirection, OrderNumber, OrderStatus};

const SCHEMA: &str = include_str!("../../migrations/001_create_ledger.sql");

/// Postgres SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// PostgreSQL ledger store
///
/// Money movement runs in a transaction that locks the affected row with
/// `SELECT ... FOR UPDATE`; uniqueness is enforced by table constraints.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool
    pub async fn connect(uri: &str, max_connections: u32, acquire_timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(uri)
            .await
            .map_err(|e| LedgerError::transient(format!("connect: {}", e)))?;

        info!(max_connections, "Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error(e, "schema"))?;

        info!("Ledger schema is up to date");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn create_account(&self, username: &str, password_hash: &str) -> Result<AccountId> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (username, password, balance, withdrawn, created_at)
            VALUES ($1, $2, 0, 0, now())
            RETURNING id
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_error(e, &format!("user {}", username)))?;

        Ok(AccountId(get(&row, "id")?))
    }

    async fn get_account(&self, username: &str) -> Result<Account> {
        let row = sqlx::query(
            "SELECT id, username, password, balance, withdrawn, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_error(e, "user"))?
        .ok_or_else(|| LedgerError::not_found(format!("user {}", username)))?;

        row_to_account(&row)
    }

    async fn get_account_by_id(&self, id: AccountId) -> Result<Account> {
        let row = sqlx::query(
            "SELECT id, username, password, balance, withdrawn, created_at FROM users WHERE id = $1",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_error(e, "account"))?
        .ok_or_else(|| LedgerError::not_found(format!("account {}", id)))?;

        row_to_account(&row)
    }

    async fn update_account(&self, account: &Account) -> Result<()> {
        let result = sqlx::query("UPDATE users SET balance = $1, withdrawn = $2 WHERE id = $3")
            .bind(account.balance)
            .bind(account.withdrawn)
            .bind(account.id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error(e, "account"))?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found(format!("account {}", account.id)));
        }
        Ok(())
    }

    async fn create_order(&self, order: &Order) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO orders (number, type, user_id, value, status, uploaded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(order.number.as_str())
        .bind(order.direction.as_str())
        .bind(order.account_id.get())
        .bind(order.value)
        .bind(order.status.as_str())
        .bind(order.uploaded_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            // The owner row is gone
            if sqlstate(&e).as_deref() == Some(FOREIGN_KEY_VIOLATION) {
                LedgerError::not_found(format!("account {}", order.account_id))
            } else {
                map_db_error(e, &format!("order {}", order.number))
            }
        })?;

        get(&row, "id")
    }

    async fn get_order(&self, number: &OrderNumber) -> Result<Order> {
        let row = sqlx::query(
            "SELECT id, number, type, user_id, value, status, uploaded_at FROM orders WHERE number = $1",
        )
        .bind(number.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_error(e, "order"))?
        .ok_or_else(|| LedgerError::not_found(format!("order {}", number)))?;

        row_to_order(&row)
    }

    async fn list_orders(&self, account_id: AccountId, direction: OrderDirection) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, number, type, user_id, value, status, uploaded_at
            FROM orders
            WHERE user_id = $1 AND type = $2
            ORDER BY id
            "#,
        )
        .bind(account_id.get())
        .bind(direction.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_error(e, "orders"))?;

        rows.iter().map(row_to_order).collect()
    }

    #[instrument(skip(self))]
    async fn orders_awaiting_verdict(&self) -> Result<Vec<OrderNumber>> {
        let rows = sqlx::query(
            r#"
            SELECT number FROM orders
            WHERE type = 'credit' AND status NOT IN ('PROCESSED', 'INVALID')
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_error(e, "orders"))?;

        rows.iter()
            .map(|row| parse_number(&get::<String>(row, "number")?))
            .collect()
    }

    #[instrument(skip(self), fields(order = %number))]
    async fn settle_order(&self, number: &OrderNumber, status: OrderStatus, accrual: f64) -> Result<bool> {
        check_verdict(status, accrual)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_db_error(e, "transaction"))?;

        let row = sqlx::query("SELECT user_id, status FROM orders WHERE number = $1 FOR UPDATE")
            .bind(number.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_db_error(e, "order"))?
            .ok_or_else(|| LedgerError::not_found(format!("order {}", number)))?;

        let current = parse_status(&get::<String>(&row, "status")?)?;
        if current.is_terminal() {
            debug!(%current, "Order already settled");
            return Ok(false);
        }
        let owner: i64 = get(&row, "user_id")?;

        sqlx::query("UPDATE orders SET status = $1, value = $2 WHERE number = $3")
            .bind(status.as_str())
            .bind(accrual)
            .bind(number.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_db_error(e, "order"))?;

        sqlx::query("UPDATE users SET balance = balance + $1 WHERE id = $2")
            .bind(accrual)
            .bind(owner)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_db_error(e, "account"))?;

        tx.commit()
            .await
            .map_err(|e| map_db_error(e, "transaction"))?;

        Ok(true)
    }

    #[instrument(skip(self, order), fields(order = %order.number, account_id = %order.account_id))]
    async fn withdraw(&self, order: &Order) -> Result<i64> {
        check_debit(order)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_db_error(e, "transaction"))?;

        let row = sqlx::query("SELECT balance FROM users WHERE id = $1 FOR UPDATE")
            .bind(order.account_id.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_db_error(e, "account"))?
            .ok_or_else(|| LedgerError::not_found(format!("account {}", order.account_id)))?;

        let available: f64 = get(&row, "balance")?;
        if available < order.value {
            return Err(LedgerError::InsufficientFunds {
                requested: order.value,
                available,
            });
        }

        // A concurrent insert of the same number surfaces as unique_violation
        let row = sqlx::query(
            r#"
            INSERT INTO orders (number, type, user_id, value, status, uploaded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(order.number.as_str())
        .bind(OrderDirection::Debit.as_str())
        .bind(order.account_id.get())
        .bind(order.value)
        .bind(order.status.as_str())
        .bind(order.uploaded_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_db_error(e, &format!("order {}", order.number)))?;
        let id: i64 = get(&row, "id")?;

        sqlx::query("UPDATE users SET balance = balance - $1, withdrawn = withdrawn + $1 WHERE id = $2")
            .bind(order.value)
            .bind(order.account_id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_db_error(e, "account"))?;

        tx.commit()
            .await
            .map_err(|e| map_db_error(e, "transaction"))?;

        Ok(id)
    }
}

/// Translate a driver error into a ledger outcome
///
/// `what` names the entity for `NotFound` / `AlreadyExists` messages.
fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|code| code.into_owned()),
        _ => None,
    }
}

/// Constraint violations that are domain outcomes rather than failures
fn classify_sqlstate(code: &str, what: &str) -> Option<LedgerError> {
    match code {
        UNIQUE_VIOLATION => Some(LedgerError::already_exists(what)),
        FOREIGN_KEY_VIOLATION => Some(LedgerError::not_found(what)),
        _ => None,
    }
}

fn map_db_error(err: sqlx::Error, what: &str) -> LedgerError {
    if let sqlx::Error::RowNotFound = err {
        return LedgerError::not_found(what);
    }
    sqlstate(&err)
        .and_then(|code| classify_sqlstate(&code, what))
        .unwrap_or_else(|| LedgerError::transient(err.to_string()))
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| LedgerError::Internal(format!("column {}: {}", column, e)))
}

fn parse_status(raw: &str) -> Result<OrderStatus> {
    raw.parse().map_err(LedgerError::Internal)
}

fn parse_direction(raw: &str) -> Result<OrderDirection> {
    raw.parse().map_err(LedgerError::Internal)
}

fn parse_number(raw: &str) -> Result<OrderNumber> {
    OrderNumber::parse(raw).map_err(|e| LedgerError::Internal(e.to_string()))
}

fn row_to_account(row: &PgRow) -> Result<Account> {
    Ok(Account {
        id: AccountId(get(row, "id")?),
        username: get(row, "username")?,
        password_hash: get(row, "password")?,
        balance: get(row, "balance")?,
        withdrawn: get(row, "withdrawn")?,
        created_at: get(row, "created_at")?,
    })
}

fn row_to_order(row: &PgRow) -> Result<Order> {
    Ok(Order {
        id: get(row, "id")?,
        number: parse_number(&get::<String>(row, "number")?)?,
        direction: parse_direction(&get::<String>(row, "type")?)?,
        account_id: AccountId(get(row, "user_id")?),
        status: parse_status(&get::<String>(row, "status")?)?,
        value: get(row, "value")?,
        uploaded_at: get(row, "uploaded_at")?,
    })
}
