//! Common types and utilities for the loyalty ledger
//!
//! This crate provides shared types used across all ledger crates.
//!
//! # Modules
//!
//! - [`error`] - Common error types
//! - [`types`] - Shared identifier types (AccountId, OrderNumber)
//! - [`luhn`] - Luhn mod-10 checksum used to pre-validate order numbers

pub mod error;
pub mod luhn;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
