//! In-memory ledger store implementation

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::error::{LedgerError, Result};
use crate::store::traits::{check_debit, check_verdict, LedgerStore};
use crate::types::{Account, AccountId, Order, OrderDirection, OrderNumber, OrderStatus};

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<AccountId, Account>,
    usernames: HashMap<String, AccountId>,
    /// Insertion order is the listing order
    orders: Vec<Order>,
    order_index: HashMap<String, usize>,
    last_account_id: i64,
    last_order_id: i64,
}

impl LedgerState {
    fn order_mut(&mut self, number: &OrderNumber) -> Option<&mut Order> {
        let idx = *self.order_index.get(number.as_str())?;
        self.orders.get_mut(idx)
    }

    fn insert_order(&mut self, order: &Order) -> i64 {
        self.last_order_id += 1;
        let mut stored = order.clone();
        stored.id = self.last_order_id;
        self.order_index
            .insert(stored.number.to_string(), self.orders.len());
        self.orders.push(stored);
        self.last_order_id
    }
}

/// Process-local store for development and tests
///
/// Every operation runs under a single lock, so each call is atomic with
/// respect to every other call.
pub struct InMemoryLedgerStore {
    state: Mutex<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
        }
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn create_account(&self, username: &str, password_hash: &str) -> Result<AccountId> {
        let mut state = self.state.lock();

        if state.usernames.contains_key(username) {
            return Err(LedgerError::already_exists(format!("user {}", username)));
        }

        state.last_account_id += 1;
        let id = AccountId(state.last_account_id);
        state.accounts.insert(
            id,
            Account {
                id,
                username: username.to_string(),
                password_hash: password_hash.to_string(),
                balance: 0.0,
                withdrawn: 0.0,
                created_at: Utc::now(),
            },
        );
        state.usernames.insert(username.to_string(), id);

        Ok(id)
    }

    async fn get_account(&self, username: &str) -> Result<Account> {
        let state = self.state.lock();
        state
            .usernames
            .get(username)
            .and_then(|id| state.accounts.get(id))
            .cloned()
            .ok_or_else(|| LedgerError::not_found(format!("user {}", username)))
    }

    async fn get_account_by_id(&self, id: AccountId) -> Result<Account> {
        let state = self.state.lock();
        state
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found(format!("account {}", id)))
    }

    async fn update_account(&self, account: &Account) -> Result<()> {
        let mut state = self.state.lock();
        let stored = state
            .accounts
            .get_mut(&account.id)
            .ok_or_else(|| LedgerError::not_found(format!("account {}", account.id)))?;

        stored.balance = account.balance;
        stored.withdrawn = account.withdrawn;
        Ok(())
    }

    async fn create_order(&self, order: &Order) -> Result<i64> {
        let mut state = self.state.lock();

        if state.order_index.contains_key(order.number.as_str()) {
            return Err(LedgerError::already_exists(format!("order {}", order.number)));
        }
        if !state.accounts.contains_key(&order.account_id) {
            return Err(LedgerError::not_found(format!("account {}", order.account_id)));
        }

        Ok(state.insert_order(order))
    }

    async fn get_order(&self, number: &OrderNumber) -> Result<Order> {
        let state = self.state.lock();
        state
            .order_index
            .get(number.as_str())
            .and_then(|idx| state.orders.get(*idx))
            .cloned()
            .ok_or_else(|| LedgerError::not_found(format!("order {}", number)))
    }

    async fn list_orders(&self, account_id: AccountId, direction: OrderDirection) -> Result<Vec<Order>> {
        let state = self.state.lock();
        Ok(state
            .orders
            .iter()
            .filter(|o| o.account_id == account_id && o.direction == direction)
            .cloned()
            .collect())
    }

    async fn orders_awaiting_verdict(&self) -> Result<Vec<OrderNumber>> {
        let state = self.state.lock();
        Ok(state
            .orders
            .iter()
            .filter(|o| o.is_awaiting_verdict())
            .map(|o| o.number.clone())
            .collect())
    }

    async fn settle_order(&self, number: &OrderNumber, status: OrderStatus, accrual: f64) -> Result<bool> {
        check_verdict(status, accrual)?;

        let mut state = self.state.lock();
        let order = state
            .order_mut(number)
            .ok_or_else(|| LedgerError::not_found(format!("order {}", number)))?;

        if order.status.is_terminal() {
            return Ok(false);
        }

        order.status = status;
        order.value = accrual;
        let owner = order.account_id;

        let account = state
            .accounts
            .get_mut(&owner)
            .ok_or_else(|| LedgerError::Internal(format!("order {} has no owner {}", number, owner)))?;
        account.balance += accrual;

        Ok(true)
    }

    async fn withdraw(&self, order: &Order) -> Result<i64> {
        check_debit(order)?;

        let mut state = self.state.lock();

        if state.order_index.contains_key(order.number.as_str()) {
            return Err(LedgerError::already_exists(format!("order {}", order.number)));
        }

        let account = state
            .accounts
            .get_mut(&order.account_id)
            .ok_or_else(|| LedgerError::not_found(format!("account {}", order.account_id)))?;

        if account.balance < order.value {
            return Err(LedgerError::InsufficientFunds {
                requested: order.value,
                available: account.balance,
            });
        }

        account.balance -= order.value;
        account.withdrawn += order.value;

        Ok(state.insert_order(order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::test_support::{luhn_number, number};
    use std::sync::Arc;

    async fn store_with_account() -> (InMemoryLedgerStore, AccountId) {
        let store = InMemoryLedgerStore::new();
        let id = store.create_account("alice", "hash").await.unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn test_account_lifecycle() {
        let (store, id) = store_with_account().await;
        assert_eq!(id, AccountId(1));

        let account = store.get_account("alice").await.unwrap();
        assert_eq!(account.id, id);
        assert_eq!(account.balance, 0.0);
        assert_eq!(account.withdrawn, 0.0);

        assert_matches!(
            store.create_account("alice", "other").await,
            Err(LedgerError::AlreadyExists(_))
        );
        assert_matches!(store.get_account("bob").await, Err(LedgerError::NotFound(_)));
        assert_matches!(
            store.get_account_by_id(AccountId(99)).await,
            Err(LedgerError::NotFound(_))
        );

        let bob = store.create_account("bob", "hash").await.unwrap();
        assert_eq!(bob, AccountId(2));
    }

    #[tokio::test]
    async fn test_update_account() {
        let (store, id) = store_with_account().await;
        let mut account = store.get_account_by_id(id).await.unwrap();
        account.balance = 12.5;
        account.withdrawn = 3.0;
        store.update_account(&account).await.unwrap();

        let reloaded = store.get_account_by_id(id).await.unwrap();
        assert_eq!(reloaded.balance(), account.balance());
    }

    #[tokio::test]
    async fn test_order_uniqueness_across_owners() {
        let (store, alice) = store_with_account().await;
        let bob = store.create_account("bob", "hash").await.unwrap();

        store
            .create_order(&Order::credit(alice, number("79927398713")))
            .await
            .unwrap();
        assert_matches!(
            store.create_order(&Order::credit(bob, number("79927398713"))).await,
            Err(LedgerError::AlreadyExists(_))
        );

        let order = store.get_order(&number("79927398713")).await.unwrap();
        assert_eq!(order.account_id, alice);
        assert_eq!(order.id, 1);
    }

    #[tokio::test]
    async fn test_list_orders_by_direction_in_insertion_order() {
        let (store, id) = store_with_account().await;
        let numbers = ["79927398713", "12345678903", "4561261212345467"];
        for raw in numbers {
            store.create_order(&Order::credit(id, number(raw))).await.unwrap();
        }

        let credits = store.list_orders(id, OrderDirection::Credit).await.unwrap();
        let listed: Vec<_> = credits.iter().map(|o| o.number.to_string()).collect();
        assert_eq!(listed, numbers);

        assert!(store.list_orders(id, OrderDirection::Debit).await.unwrap().is_empty());
        assert!(store
            .list_orders(AccountId(42), OrderDirection::Credit)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_settle_credits_owner_once() {
        let (store, id) = store_with_account().await;
        let n = number("79927398713");
        store.create_order(&Order::credit(id, n.clone())).await.unwrap();
        assert_eq!(store.orders_awaiting_verdict().await.unwrap(), vec![n.clone()]);

        assert!(store.settle_order(&n, OrderStatus::Processed, 500.0).await.unwrap());
        assert_eq!(store.get_account_by_id(id).await.unwrap().balance, 500.0);
        assert!(store.orders_awaiting_verdict().await.unwrap().is_empty());

        // Replayed verdict is a no-op
        assert!(!store.settle_order(&n, OrderStatus::Processed, 500.0).await.unwrap());
        assert_eq!(store.get_account_by_id(id).await.unwrap().balance, 500.0);

        let order = store.get_order(&n).await.unwrap();
        assert_eq!(order.status, OrderStatus::Processed);
        assert_eq!(order.value, 500.0);
    }

    #[tokio::test]
    async fn test_settle_invalid_leaves_balance() {
        let (store, id) = store_with_account().await;
        let n = number("12345678903");
        store.create_order(&Order::credit(id, n.clone())).await.unwrap();

        assert!(store.settle_order(&n, OrderStatus::Invalid, 0.0).await.unwrap());
        assert_eq!(store.get_account_by_id(id).await.unwrap().balance, 0.0);
        assert!(store.orders_awaiting_verdict().await.unwrap().is_empty());

        assert_matches!(
            store
                .settle_order(&number("79927398713"), OrderStatus::Processed, 1.0)
                .await,
            Err(LedgerError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn test_withdraw_rules() {
        let (store, id) = store_with_account().await;
        let n = number("79927398713");
        store.create_order(&Order::credit(id, n.clone())).await.unwrap();
        store.settle_order(&n, OrderStatus::Processed, 500.0).await.unwrap();

        store
            .withdraw(&Order::debit(id, number("12345678903"), 200.0))
            .await
            .unwrap();
        let balance = store.get_account_by_id(id).await.unwrap().balance();
        assert_eq!(balance, crate::types::Balance { current: 300.0, withdrawn: 200.0 });

        assert_matches!(
            store.withdraw(&Order::debit(id, number("4561261212345467"), 400.0)).await,
            Err(LedgerError::InsufficientFunds { .. })
        );
        assert_matches!(
            store.withdraw(&Order::debit(id, number("12345678903"), 1.0)).await,
            Err(LedgerError::AlreadyExists(_))
        );

        let balance = store.get_account_by_id(id).await.unwrap().balance();
        assert_eq!(balance.current, 300.0);
        assert_eq!(balance.withdrawn, 200.0);
        assert_eq!(store.list_orders(id, OrderDirection::Debit).await.unwrap().len(), 1);
        // Debits never enter the awaiting set
        assert!(store.orders_awaiting_verdict().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_withdrawals_never_overdraw() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let barrier = Arc::new(tokio::sync::Barrier::new(16));
        let id = store.create_account("alice", "hash").await.unwrap();
        let mut account = store.get_account_by_id(id).await.unwrap();
        account.balance = 100.0;
        store.update_account(&account).await.unwrap();

        let numbers: Vec<OrderNumber> = (1..=16u64).map(luhn_number).collect();

        let handles: Vec<_> = numbers
            .into_iter()
            .map(|n| {
                let store = store.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    store.withdraw(&Order::debit(id, n, 100.0)).await
                })
            })
            .collect();

        let mut ok = 0;
        let mut insufficient = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(LedgerError::InsufficientFunds { .. }) => insufficient += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(ok, 1);
        assert_eq!(insufficient, 15);
        let account = store.get_account_by_id(id).await.unwrap();
        assert_eq!(account.balance, 0.0);
        assert_eq!(account.withdrawn, 100.0);
    }
}
