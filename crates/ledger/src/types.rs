//! Ledger domain types

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use common::{AccountId, OrderNumber};

/// Order lifecycle status
///
/// Credit orders start as `NEW` and end in one of the terminal states once
/// the accrual service has a verdict. Debit orders are created `PROCESSED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    Processing,
    Processed,
    Invalid,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Processed => "PROCESSED",
            OrderStatus::Invalid => "INVALID",
        }
    }

    /// `PROCESSED` and `INVALID` are final
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Processed | OrderStatus::Invalid)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(OrderStatus::New),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "PROCESSED" => Ok(OrderStatus::Processed),
            "INVALID" => Ok(OrderStatus::Invalid),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

/// Credit orders add to the balance, debit orders are withdrawals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    Credit,
    Debit,
}

impl OrderDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderDirection::Credit => "credit",
            OrderDirection::Debit => "debit",
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(OrderDirection::Credit),
            "debit" => Ok(OrderDirection::Debit),
            other => Err(format!("unknown order direction: {}", other)),
        }
    }
}

/// A registered user and their money
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    /// PHC-format password hash
    pub password_hash: String,
    /// Spendable balance, never negative
    pub balance: f64,
    /// Lifetime total withdrawn
    pub withdrawn: f64,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn balance(&self) -> Balance {
        Balance {
            current: self.balance,
            withdrawn: self.withdrawn,
        }
    }
}

/// An order in the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    /// Store-assigned id; zero until persisted
    pub id: i64,
    pub number: OrderNumber,
    pub direction: OrderDirection,
    pub account_id: AccountId,
    pub status: OrderStatus,
    /// Accrual for credits (zero until settled), amount for debits
    pub value: f64,
    pub uploaded_at: DateTime<Utc>,
}

impl Order {
    /// A fresh credit order awaiting its verdict
    pub fn credit(account_id: AccountId, number: OrderNumber) -> Self {
        Self {
            id: 0,
            number,
            direction: OrderDirection::Credit,
            account_id,
            status: OrderStatus::New,
            value: 0.0,
            uploaded_at: Utc::now(),
        }
    }

    /// A withdrawal, settled at creation
    pub fn debit(account_id: AccountId, number: OrderNumber, amount: f64) -> Self {
        Self {
            id: 0,
            number,
            direction: OrderDirection::Debit,
            account_id,
            status: OrderStatus::Processed,
            value: amount,
            uploaded_at: Utc::now(),
        }
    }

    /// Credit order that still needs a verdict
    pub fn is_awaiting_verdict(&self) -> bool {
        self.direction == OrderDirection::Credit && !self.status.is_terminal()
    }
}

/// Balance snapshot returned to clients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub current: f64,
    pub withdrawn: f64,
}

/// Credit order as listed to its owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditView {
    pub number: String,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accrual: Option<f64>,
    pub uploaded_at: String,
}

impl From<&Order> for CreditView {
    fn from(order: &Order) -> Self {
        Self {
            number: order.number.to_string(),
            status: order.status,
            accrual: (order.status == OrderStatus::Processed).then_some(order.value),
            uploaded_at: rfc3339(order.uploaded_at),
        }
    }
}

/// Withdrawal as listed to its owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebitView {
    pub order: String,
    pub sum: f64,
    pub processed_at: String,
}

impl From<&Order> for DebitView {
    fn from(order: &Order) -> Self {
        Self {
            order: order.number.to_string(),
            sum: order.value,
            processed_at: rfc3339(order.uploaded_at),
        }
    }
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
