//! Liveness endpoint

use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

/// `GET /health`
pub async fn simple_health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_payload() {
        let Json(body) = simple_health_handler().await;
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].is_string());
    }
}
