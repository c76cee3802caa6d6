//! Common types used across the loyalty ledger
//!
//! Identifiers are wrapped in newtypes so that an account id can never be
//! passed where an order id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;
use crate::luhn;

/// Unique identifier for accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl AccountId {
    /// Get the raw numeric id
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for AccountId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user-supplied order number that has passed the Luhn check
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Parse and validate an order number.
    ///
    /// Surrounding whitespace is trimmed; the remainder must be all digits
    /// and satisfy the Luhn checksum.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let trimmed = raw.trim();
        if luhn::is_valid(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(Error::InvalidOrderNumber(trimmed.to_string()))
        }
    }

    /// Borrow the number as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner string
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OrderNumber> for String {
    fn from(number: OrderNumber) -> Self {
        number.0
    }
}

impl AsRef<str> for OrderNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_number_parse() {
        let number = OrderNumber::parse(" 79927398713\n").unwrap();
        assert_eq!(number.as_str(), "79927398713");

        assert!(matches!(
            OrderNumber::parse("79927398710"),
            Err(Error::InvalidOrderNumber(_))
        ));
    }

    #[test]
    fn test_order_number_serde() {
        let number: OrderNumber = serde_json::from_str("\"12345678903\"").unwrap();
        assert_eq!(number.to_string(), "12345678903");

        assert!(serde_json::from_str::<OrderNumber>("\"12345678901\"").is_err());
        assert_eq!(serde_json::to_string(&number).unwrap(), "\"12345678903\"");
    }

    #[test]
    fn test_account_id_display() {
        assert_eq!(AccountId(42).to_string(), "42");
        assert_eq!(AccountId::from(7).get(), 7);
    }
}
