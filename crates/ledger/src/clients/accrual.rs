//! Accrual client - trait and implementations

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{LedgerError, Result};
use crate::types::{OrderNumber, OrderStatus};

/// Status reported by the accrual service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccrualStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
}

impl fmt::Display for AccrualStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccrualStatus::Registered => "REGISTERED",
            AccrualStatus::Processing => "PROCESSING",
            AccrualStatus::Invalid => "INVALID",
            AccrualStatus::Processed => "PROCESSED",
        };
        f.write_str(s)
    }
}

/// Body of `GET /api/orders/{number}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccrualVerdict {
    /// Number echoed back by the service
    pub order: String,
    pub status: AccrualStatus,
    /// Present only for `PROCESSED`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accrual: Option<f64>,
}

impl AccrualVerdict {
    /// Reject values no ledger should ever apply
    pub fn validate(self) -> Result<Self> {
        match self.accrual {
            Some(v) if !v.is_finite() || v < 0.0 => Err(LedgerError::transient(format!(
                "accrual service returned invalid accrual {} for {}",
                v, self.order
            ))),
            _ => Ok(self),
        }
    }

    /// The ledger update this verdict calls for, if any
    ///
    /// `INVALID` always settles with zero; non-terminal statuses yield `None`.
    pub fn settlement(&self) -> Option<(OrderStatus, f64)> {
        match self.status {
            AccrualStatus::Processed => Some((OrderStatus::Processed, self.accrual.unwrap_or(0.0))),
            AccrualStatus::Invalid => Some((OrderStatus::Invalid, 0.0)),
            AccrualStatus::Registered | AccrualStatus::Processing => None,
        }
    }
}

/// Client trait for the accrual service - protocol agnostic
#[async_trait]
pub trait AccrualClient: Send + Sync {
    /// Ask for the verdict on one order
    ///
    /// `Ok(None)` means the service has nothing for us yet (any non-200
    /// answer). Transport failures, timeouts and unparsable bodies are
    /// `Transient` errors.
    async fn lookup(&self, number: &OrderNumber) -> Result<Option<AccrualVerdict>>;
}

// ==================== Mock Implementation ====================

#[derive(Debug, Clone)]
enum MockResponse {
    Verdict(AccrualVerdict),
    Failure(String),
}

/// Mock accrual client for testing
///
/// Numbers without a programmed response answer "no verdict yet".
#[derive(Default)]
pub struct MockAccrualClient {
    responses: Mutex<HashMap<String, MockResponse>>,
    calls: AtomicUsize,
}

impl MockAccrualClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Program a verdict for a number
    pub fn set_verdict(&self, number: &str, status: AccrualStatus, accrual: Option<f64>) {
        self.responses.lock().insert(
            number.to_string(),
            MockResponse::Verdict(AccrualVerdict {
                order: number.to_string(),
                status,
                accrual,
            }),
        );
    }

    /// Make lookups for a number fail
    pub fn set_failure(&self, number: &str, message: impl Into<String>) {
        self.responses
            .lock()
            .insert(number.to_string(), MockResponse::Failure(message.into()));
    }

    /// Builder form of [`set_verdict`](Self::set_verdict)
    pub fn with_verdict(self, number: &str, status: AccrualStatus, accrual: Option<f64>) -> Self {
        self.set_verdict(number, status, accrual);
        self
    }

    /// Total lookups served
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccrualClient for MockAccrualClient {
    async fn lookup(&self, number: &OrderNumber) -> Result<Option<AccrualVerdict>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let response = self.responses.lock().get(number.as_str()).cloned();
        match response {
            Some(MockResponse::Verdict(verdict)) => verdict.validate().map(Some),
            Some(MockResponse::Failure(message)) => Err(LedgerError::Transient(message)),
            None => Ok(None),
        }
    }
}

// ==================== HTTP Implementation ====================

#[cfg(feature = "client")]
pub mod http {
    use async_trait::async_trait;
    use reqwest::{Client, StatusCode};
    use std::time::Duration;
    use tracing::debug;

    use super::{AccrualClient, AccrualVerdict};
    use crate::error::{LedgerError, Result};
    use crate::types::OrderNumber;

    /// Default per-request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// HTTP-based accrual client
    #[derive(Clone)]
    pub struct HttpAccrualClient {
        client: Client,
        base_url: String,
    }

    impl HttpAccrualClient {
        /// Create a client for `base_url` (e.g. `http://localhost:9090`)
        pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
            let client = Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| LedgerError::Internal(format!("http client: {}", e)))?;

            Ok(Self {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
            })
        }

        pub fn from_config(accrual: &config::AccrualConfig) -> Result<Self> {
            Self::new(&accrual.address, Duration::from_secs(accrual.timeout_seconds))
        }

        fn order_url(&self, number: &OrderNumber) -> String {
            format!("{}/api/orders/{}", self.base_url, number)
        }
    }

    #[async_trait]
    impl AccrualClient for HttpAccrualClient {
        async fn lookup(&self, number: &OrderNumber) -> Result<Option<AccrualVerdict>> {
            let url = self.order_url(number);

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| LedgerError::transient(format!("GET {}: {}", url, e)))?;

            let status = response.status();
            if status != StatusCode::OK {
                debug!(order = %number, %status, "No verdict from accrual service");
                return Ok(None);
            }

            let verdict = response
                .json::<AccrualVerdict>()
                .await
                .map_err(|e| LedgerError::transient(format!("decode {}: {}", url, e)))?;

            verdict.validate().map(Some)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::clients::accrual::AccrualStatus;
        use crate::test_support::number;
        use assert_matches::assert_matches;
        use axum::{extract::Path, http::StatusCode as AxumStatus, response::IntoResponse, routing::get, Json, Router};
        use serde_json::json;

        async fn stub(Path(number): Path<String>) -> axum::response::Response {
            match number.as_str() {
                "79927398713" => Json(json!({"order": number, "status": "PROCESSED", "accrual": 500})).into_response(),
                "12345678903" => Json(json!({"order": number, "status": "INVALID"})).into_response(),
                "4561261212345467" => Json(json!({"order": number, "status": "PROCESSING"})).into_response(),
                "0" => (AxumStatus::OK, "not json").into_response(),
                "18" => Json(json!({"order": number, "status": "PROCESSED", "accrual": -3})).into_response(),
                "26" => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    AxumStatus::NO_CONTENT.into_response()
                }
                "34" => AxumStatus::TOO_MANY_REQUESTS.into_response(),
                _ => AxumStatus::NO_CONTENT.into_response(),
            }
        }

        async fn spawn_stub() -> String {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let app = Router::new().route("/api/orders/:number", get(stub));
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            format!("http://{}/", addr)
        }

        #[tokio::test]
        async fn test_lookup_verdicts() {
            let base = spawn_stub().await;
            let client = HttpAccrualClient::new(&base, DEFAULT_TIMEOUT).unwrap();

            let verdict = client.lookup(&number("79927398713")).await.unwrap().unwrap();
            assert_eq!(verdict.status, AccrualStatus::Processed);
            assert_eq!(verdict.accrual, Some(500.0));

            let verdict = client.lookup(&number("12345678903")).await.unwrap().unwrap();
            assert_eq!(verdict.settlement(), Some((crate::types::OrderStatus::Invalid, 0.0)));

            let verdict = client.lookup(&number("4561261212345467")).await.unwrap().unwrap();
            assert_eq!(verdict.settlement(), None);
        }

        #[tokio::test]
        async fn test_non_200_is_no_verdict() {
            let base = spawn_stub().await;
            let client = HttpAccrualClient::new(&base, DEFAULT_TIMEOUT).unwrap();

            assert_eq!(client.lookup(&number("42")).await.unwrap(), None);
            assert_eq!(client.lookup(&number("34")).await.unwrap(), None);
        }

        #[tokio::test]
        async fn test_bad_bodies_are_transient() {
            let base = spawn_stub().await;
            let client = HttpAccrualClient::new(&base, DEFAULT_TIMEOUT).unwrap();

            assert_matches!(client.lookup(&number("0")).await, Err(LedgerError::Transient(_)));
            assert_matches!(client.lookup(&number("18")).await, Err(LedgerError::Transient(_)));
        }

        #[tokio::test]
        async fn test_timeout_is_transient() {
            let base = spawn_stub().await;
            let client = HttpAccrualClient::new(&base, Duration::from_millis(200)).unwrap();

            assert_matches!(client.lookup(&number("26")).await, Err(LedgerError::Transient(_)));
        }

        #[tokio::test]
        async fn test_unreachable_is_transient() {
            // Bind then drop to get a port nobody listens on
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            drop(listener);

            let client = HttpAccrualClient::new(&format!("http://{}", addr), DEFAULT_TIMEOUT).unwrap();
            assert_matches!(
                client.lookup(&number("79927398713")).await,
                Err(LedgerError::Transient(_))
            );
        }
    }
}
