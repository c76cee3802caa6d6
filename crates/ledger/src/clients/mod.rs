//! Clients for external services

pub mod accrual;
