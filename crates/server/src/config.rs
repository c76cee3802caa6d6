//! Listener configuration
//!
//! The ledger exposes a single HTTP listener configured as a `host:port`
//! string (for example `localhost:8080` or `0.0.0.0:8080`).

use crate::error::{Result, ServerError};
use std::time::Duration;

/// Default listener address
pub const DEFAULT_ADDRESS: &str = "localhost:8080";

/// Default upper bound on a single request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP listener configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host name or IP to bind
    pub host: String,
    /// Port to bind; 0 asks the OS for an ephemeral port
    pub port: u16,
    /// Per-request timeout applied by the server middleware
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Create a configuration from host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Parse a `host:port` address
    ///
    /// A leading `http://` is tolerated and stripped. IPv6 hosts must be
    /// bracketed (`[::1]:8080`).
    pub fn from_address(address: &str) -> Result<Self> {
        let trimmed = address.trim();
        let trimmed = trimmed.strip_prefix("http://").unwrap_or(trimmed);
        let trimmed = trimmed.trim_end_matches('/');

        let (host, port) = trimmed
            .rsplit_once(':')
            .ok_or_else(|| ServerError::InvalidAddress(address.to_string()))?;

        let port: u16 = port
            .parse()
            .map_err(|_| ServerError::InvalidAddress(address.to_string()))?;

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(ServerError::InvalidAddress(address.to_string()));
        }

        Ok(Self::new(host, port))
    }

    /// Override the per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// The address in `host:port` form, suitable for `TcpListener::bind`
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}
