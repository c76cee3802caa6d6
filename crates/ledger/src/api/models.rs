//! API models for the ledger HTTP endpoints

use serde::{Deserialize, Serialize};

/// Body of register and login requests
#[derive(Debug, Serialize, Deserialize)]
pub struct CredentialsRequest {
    pub login: String,
    pub password: String,
}

/// Issued token, also sent as header and cookie
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Withdrawal request
#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub order: String,
    pub sum: f64,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

/// Error detail
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }
}
