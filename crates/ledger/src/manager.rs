//! Order Manager - business rules for accounts, credits and withdrawals

use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::auth::CredentialService;
use crate::error::{LedgerError, Result};
use crate::store::traits::LedgerStore;
use crate::types::{AccountId, Balance, CreditView, DebitView, Order, OrderDirection, OrderNumber};

/// Order Manager - admits orders and withdrawals into the ledger
///
/// Order numbers reach this type already Luhn-validated (see
/// [`OrderNumber::parse`]).
#[derive(Clone)]
pub struct OrderManager {
    store: Arc<dyn LedgerStore>,
    credentials: CredentialService,
}

impl OrderManager {
    pub fn new(store: Arc<dyn LedgerStore>, credentials: CredentialService) -> Self {
        Self { store, credentials }
    }

    /// The underlying store, shared with the reconciliation worker
    pub fn store(&self) -> Arc<dyn LedgerStore> {
        self.store.clone()
    }

    /// Register a new account
    ///
    /// Returns `AlreadyExists` when the login is taken.
    #[instrument(skip(self, password))]
    pub async fn register_account(&self, login: &str, password: &str) -> Result<AccountId> {
        if login.is_empty() || password.is_empty() {
            return Err(LedgerError::invalid_input("login and password are required"));
        }

        let credentials = self.credentials.clone();
        let secret = password.to_owned();
        let hash = tokio::task::spawn_blocking(move || credentials.hash(&secret))
            .await
            .map_err(|e| LedgerError::Internal(format!("hashing task failed: {}", e)))??;
        let id = self.store.create_account(login, &hash).await?;

        info!(account_id = %id, "Account registered");
        Ok(id)
    }

    /// Check a login/password pair
    ///
    /// Unknown login and wrong password both yield `Unauthorized`.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, login: &str, password: &str) -> Result<AccountId> {
        let account = match self.store.get_account(login).await {
            Ok(account) => account,
            Err(LedgerError::NotFound(_)) => return Err(LedgerError::Unauthorized),
            Err(e) => return Err(e),
        };

        let credentials = self.credentials.clone();
        let secret = password.to_owned();
        let stored = account.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || credentials.verify(&secret, &stored))
            .await
            .map_err(|e| LedgerError::Internal(format!("verification task failed: {}", e)))?;

        if !matches {
            debug!(account_id = %account.id, "Password mismatch");
            return Err(LedgerError::Unauthorized);
        }

        Ok(account.id)
    }

    pub async fn balance(&self, account_id: AccountId) -> Result<Balance> {
        Ok(self.store.get_account_by_id(account_id).await?.balance())
    }

    /// Register a credit order for scoring
    ///
    /// - unknown number: stored as `NEW` with value 0
    /// - number owned by another account: `OwnershipConflict`
    /// - number already uploaded by this account: `AlreadyExists`
    #[instrument(skip(self), fields(order = %number))]
    pub async fn register_credit(&self, account_id: AccountId, number: &OrderNumber) -> Result<i64> {
        match self.store.get_order(number).await {
            Ok(existing) => return Err(self.conflict_for(account_id, &existing)),
            Err(LedgerError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        match self
            .store
            .create_order(&Order::credit(account_id, number.clone()))
            .await
        {
            Ok(id) => {
                info!(%account_id, "Credit order registered");
                Ok(id)
            }
            // Lost a race with another upload of the same number
            Err(LedgerError::AlreadyExists(_)) => {
                let existing = self.store.get_order(number).await?;
                Err(self.conflict_for(account_id, &existing))
            }
            Err(e) => Err(e),
        }
    }

    fn conflict_for(&self, account_id: AccountId, existing: &Order) -> LedgerError {
        if existing.account_id == account_id {
            LedgerError::already_exists(format!("order {}", existing.number))
        } else {
            LedgerError::OwnershipConflict(existing.number.to_string())
        }
    }

    /// Withdraw `amount` against the balance, recorded under `number`
    ///
    /// The balance check is repeated inside the store's atomic `withdraw`,
    /// so concurrent withdrawals can never overdraw.
    #[instrument(skip(self), fields(order = %number))]
    pub async fn register_debit(&self, account_id: AccountId, number: &OrderNumber, amount: f64) -> Result<i64> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(LedgerError::invalid_input(format!(
                "withdrawal amount must be positive, got {}",
                amount
            )));
        }

        match self.store.get_order(number).await {
            Ok(_) => return Err(LedgerError::already_exists(format!("order {}", number))),
            Err(LedgerError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let account = self.store.get_account_by_id(account_id).await?;
        if account.balance < amount {
            return Err(LedgerError::InsufficientFunds {
                requested: amount,
                available: account.balance,
            });
        }

        let id = self
            .store
            .withdraw(&Order::debit(account_id, number.clone(), amount))
            .await?;

        info!(%account_id, amount, "Withdrawal recorded");
        Ok(id)
    }

    /// Credit orders of the account, oldest first
    pub async fn list_credits(&self, account_id: AccountId) -> Result<Vec<CreditView>> {
        let orders = self
            .store
            .list_orders(account_id, OrderDirection::Credit)
            .await?;
        Ok(orders.iter().map(CreditView::from).collect())
    }

    /// Withdrawals of the account, oldest first
    pub async fn list_debits(&self, account_id: AccountId) -> Result<Vec<DebitView>> {
        let orders = self
            .store
            .list_orders(account_id, OrderDirection::Debit)
            .await?;
        Ok(orders.iter().map(DebitView::from).collect())
    }
}

/// Create an OrderManager over a fresh in-memory store
pub fn create_in_memory() -> OrderManager {
    OrderManager::new(
        Arc::new(crate::store::memory::InMemoryLedgerStore::new()),
        CredentialService::new(),
    )
}
