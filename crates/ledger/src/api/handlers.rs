//! API handlers for the ledger HTTP endpoints

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use tracing::{debug, error};

use crate::api::middleware::TOKEN_COOKIE;
use crate::api::models::*;
use crate::api::ApiState;
use crate::error::LedgerError;
use crate::types::{AccountId, OrderNumber};

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map a ledger error to its HTTP status and body
///
/// Only genuine failures are logged above debug.
pub fn error_response(err: LedgerError) -> ApiError {
    let (status, code) = match &err {
        LedgerError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        LedgerError::AlreadyExists(_) => (StatusCode::CONFLICT, "ALREADY_EXISTS"),
        LedgerError::OwnershipConflict(_) => (StatusCode::CONFLICT, "OWNED_BY_ANOTHER_USER"),
        LedgerError::InsufficientFunds { .. } => (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_FUNDS"),
        LedgerError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        LedgerError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
        LedgerError::Transient(_) | LedgerError::Internal(_) => {
            error!("Request failed: {}", err);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("INTERNAL_ERROR", "internal error")),
            );
        }
    };

    debug!(%status, "{}", err);
    (status, Json(ErrorResponse::new(code, err.to_string())))
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new("BAD_REQUEST", message)),
    )
}

fn invalid_number(raw: &str) -> ApiError {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ErrorResponse::new(
            "INVALID_ORDER_NUMBER",
            format!("order number {:?} fails the Luhn check", raw),
        )),
    )
}

fn require_content_type(headers: &HeaderMap, expected: &str) -> Result<(), ApiError> {
    let matches = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(expected));

    if matches {
        Ok(())
    } else {
        Err(bad_request(format!("expected Content-Type {}", expected)))
    }
}

/// 200 with the token as bearer header, `jwt` cookie and body
fn token_response(token: String) -> Response {
    let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Strict", TOKEN_COOKIE, token);
    (
        StatusCode::OK,
        [
            (header::AUTHORIZATION, format!("Bearer {}", token)),
            (header::SET_COOKIE, cookie),
        ],
        Json(TokenResponse { token }),
    )
        .into_response()
}

fn credentials(payload: Result<Json<CredentialsRequest>, JsonRejection>) -> Result<CredentialsRequest, ApiError> {
    let Json(req) = payload.map_err(|rejection| bad_request(rejection.body_text()))?;
    if req.login.is_empty() || req.password.is_empty() {
        return Err(bad_request("login and password are required"));
    }
    Ok(req)
}

/// Register a new account and sign it in
pub async fn register(
    State(state): State<ApiState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let req = credentials(payload)?;

    let account_id = state
        .manager
        .register_account(&req.login, &req.password)
        .await
        .map_err(error_response)?;
    let token = state.tokens.issue(account_id).map_err(error_response)?;

    Ok(token_response(token))
}

/// Sign in with login and password
pub async fn login(
    State(state): State<ApiState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let req = credentials(payload)?;

    let account_id = state
        .manager
        .authenticate(&req.login, &req.password)
        .await
        .map_err(error_response)?;
    let token = state.tokens.issue(account_id).map_err(error_response)?;

    Ok(token_response(token))
}

/// Upload a credit order number (text/plain body)
///
/// 202 when newly accepted, 200 when the caller already uploaded it.
pub async fn upload_order(
    State(state): State<ApiState>,
    Extension(account_id): Extension<AccountId>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, ApiError> {
    require_content_type(&headers, "text/plain")?;

    let raw = body.trim();
    if raw.is_empty() {
        return Err(bad_request("order number is required"));
    }
    let number = OrderNumber::parse(raw).map_err(|_| invalid_number(raw))?;

    match state.manager.register_credit(account_id, &number).await {
        Ok(_) => Ok(StatusCode::ACCEPTED),
        Err(LedgerError::AlreadyExists(_)) => Ok(StatusCode::OK),
        Err(e) => Err(error_response(e)),
    }
}

/// List the caller's credit orders, oldest first
pub async fn list_orders(
    State(state): State<ApiState>,
    Extension(account_id): Extension<AccountId>,
) -> Result<Response, ApiError> {
    let credits = state.manager.list_credits(account_id).await.map_err(error_response)?;
    if credits.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(credits).into_response())
}

/// Current and withdrawn totals
pub async fn get_balance(
    State(state): State<ApiState>,
    Extension(account_id): Extension<AccountId>,
) -> Result<Response, ApiError> {
    let balance = state.manager.balance(account_id).await.map_err(error_response)?;
    Ok(Json(balance).into_response())
}

/// Spend part of the balance against a new order number
pub async fn withdraw(
    State(state): State<ApiState>,
    Extension(account_id): Extension<AccountId>,
    payload: Result<Json<WithdrawRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(req) = payload.map_err(|rejection| bad_request(rejection.body_text()))?;
    let number = OrderNumber::parse(&req.order).map_err(|_| invalid_number(&req.order))?;

    match state.manager.register_debit(account_id, &number, req.sum).await {
        Ok(_) => Ok(StatusCode::OK),
        Err(LedgerError::AlreadyExists(_)) => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse::new(
                "ORDER_NUMBER_USED",
                format!("order number {} is already in use", number),
            )),
        )),
        Err(e) => Err(error_response(e)),
    }
}

/// List the caller's withdrawals, oldest first
pub async fn list_withdrawals(
    State(state): State<ApiState>,
    Extension(account_id): Extension<AccountId>,
) -> Result<Response, ApiError> {
    let debits = state.manager.list_debits(account_id).await.map_err(error_response)?;
    if debits.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(debits).into_response())
}
