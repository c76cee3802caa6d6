//! API routes for the ledger

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

use crate::api::handlers::*;
use crate::api::middleware::require_auth;
use crate::api::ApiState;

/// Create the ledger router
///
/// `/health` is added by the HTTP server wrapping this router.
pub fn create_router(state: ApiState) -> Router {
    let user = Router::new()
        .route("/api/user/orders", post(upload_order).get(list_orders))
        .route("/api/user/balance", get(get_balance))
        .route("/api/user/balance/withdraw", post(withdraw))
        .route("/api/user/withdrawals", get(list_withdrawals))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/api/user/register", post(register))
        .route("/api/user/login", post(login))
        .merge(user)
        .with_state(state)
}
