//! LedgerStore trait definition

use async_trait::async_trait;

use crate::error::{LedgerError, Result};
use crate::types::{Account, AccountId, Order, OrderDirection, OrderNumber, OrderStatus};

/// Persistence contract for accounts and orders
///
/// Both implementations enforce the same uniqueness rules (one account per
/// username, one order per number across all owners) and make every
/// mutating call atomic.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create an account with zero balance
    ///
    /// Returns `AlreadyExists` if the username is taken.
    async fn create_account(&self, username: &str, password_hash: &str) -> Result<AccountId>;

    /// Look up an account by username
    async fn get_account(&self, username: &str) -> Result<Account>;

    /// Look up an account by id
    async fn get_account_by_id(&self, id: AccountId) -> Result<Account>;

    /// Replace balance and withdrawn for `account.id`
    ///
    /// Not safe for read-modify-write under concurrency on its own; money
    /// movement goes through [`settle_order`](Self::settle_order) and
    /// [`withdraw`](Self::withdraw).
    async fn update_account(&self, account: &Account) -> Result<()>;

    /// Insert an order; `AlreadyExists` if the number is taken by anyone
    async fn create_order(&self, order: &Order) -> Result<i64>;

    /// Look up an order by number
    async fn get_order(&self, number: &OrderNumber) -> Result<Order>;

    /// Orders of one direction owned by the account, in insertion order
    async fn list_orders(&self, account_id: AccountId, direction: OrderDirection) -> Result<Vec<Order>>;

    /// Numbers of every credit order without a terminal status
    async fn orders_awaiting_verdict(&self) -> Result<Vec<OrderNumber>>;

    /// Apply a terminal verdict and credit the owner in one step
    ///
    /// Returns `false` without touching anything when the order is already
    /// terminal, so replaying a verdict never credits twice.
    async fn settle_order(&self, number: &OrderNumber, status: OrderStatus, accrual: f64) -> Result<bool>;

    /// Record a debit order and take its value from the owner in one step
    ///
    /// Fails with `AlreadyExists` if the number is taken and with
    /// `InsufficientFunds` if the balance does not cover the amount; in
    /// both cases nothing is written.
    async fn withdraw(&self, order: &Order) -> Result<i64>;
}

/// Reject verdicts the store must never persist
pub(crate) fn check_verdict(status: OrderStatus, accrual: f64) -> Result<()> {
    if !status.is_terminal() {
        return Err(LedgerError::invalid_input(format!(
            "cannot settle with non-terminal status {}",
            status
        )));
    }
    if !accrual.is_finite() || accrual < 0.0 {
        return Err(LedgerError::invalid_input(format!("invalid accrual {}", accrual)));
    }
    Ok(())
}

/// Validate a debit order before it reaches storage
pub(crate) fn check_debit(order: &Order) -> Result<()> {
    if order.direction != OrderDirection::Debit {
        return Err(LedgerError::invalid_input("withdraw requires a debit order"));
    }
    if !order.value.is_finite() || order.value <= 0.0 {
        return Err(LedgerError::invalid_input(format!(
            "withdrawal amount must be positive, got {}",
            order.value
        )));
    }
    Ok(())
}
