//! Order ledger for the loyalty service
//!
//! This crate owns the balance rules: how credit orders and withdrawals are
//! admitted, how an accrual verdict is applied, and the background worker
//! that polls the accrual service for verdicts.
//!
//! # Features
//!
//! - Account registration and password authentication
//! - Credit order registration with ownership checks
//! - Atomic withdrawals (no overdraft under concurrency)
//! - Reconciliation against the external accrual service
//!
//! # Feature Flags
//!
//! - `postgres` - Enable PostgreSQL storage
//! - `api` - Enable HTTP API
//! - `client` - Enable the HTTP accrual client

pub mod auth;
pub mod clients;
pub mod error;
pub mod manager;
pub mod store;
pub mod types;
pub mod worker;

#[cfg(feature = "api")]
pub mod api;

// Re-export commonly used types
pub use error::{LedgerError, Result};
pub use manager::OrderManager;
pub use types::{Account, Balance, CreditView, DebitView, Order, OrderDirection, OrderStatus};

// Auth exports
pub use auth::{Claims, CredentialService, TokenSigner};

// Store exports
pub use store::memory::InMemoryLedgerStore;
pub use store::traits::LedgerStore;

#[cfg(feature = "postgres")]
pub use store::postgres::PostgresLedgerStore;

// Client exports
pub use clients::accrual::{AccrualClient, AccrualStatus, AccrualVerdict, MockAccrualClient};

#[cfg(feature = "client")]
pub use clients::accrual::http::HttpAccrualClient;

// Worker exports
pub use worker::{ProcessOutcome, ReconciliationWorker, WorkerSettings};
