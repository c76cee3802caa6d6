//! HTTP API for the loyalty ledger

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;

use std::sync::Arc;

use crate::auth::TokenSigner;
use crate::manager::OrderManager;

pub use routes::create_router;

/// Shared state behind every handler
#[derive(Clone)]
pub struct ApiState {
    pub manager: OrderManager,
    pub tokens: Arc<TokenSigner>,
}

impl ApiState {
    pub fn new(manager: OrderManager, tokens: TokenSigner) -> Self {
        Self {
            manager,
            tokens: Arc::new(tokens),
        }
    }
}
