//! Ledger error types

use thiserror::Error;

/// Errors that can occur in the ledger
///
/// The first group are expected domain outcomes that the HTTP boundary maps
/// to status codes; `Transient` and `Internal` are genuine failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// Account or order does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Username or order number already taken
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Order number belongs to a different account
    #[error("Order {0} belongs to another account")]
    OwnershipConflict(String),

    /// Withdrawal exceeds the spendable balance
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: f64, available: f64 },

    /// Bad credentials or token
    #[error("Unauthorized")]
    Unauthorized,

    /// Malformed request data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage or external I/O failure
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// True for domain outcomes that are part of normal operation
    pub fn is_expected(&self) -> bool {
        !matches!(self, Self::Transient(_) | Self::Internal(_))
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }
}

impl From<common::Error> for LedgerError {
    fn from(err: common::Error) -> Self {
        match err {
            common::Error::InvalidInput(msg) => Self::InvalidInput(msg),
            common::Error::InvalidOrderNumber(number) => {
                Self::InvalidInput(format!("invalid order number: {}", number))
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;
