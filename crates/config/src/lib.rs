use serde::{Deserialize, Serialize};

pub mod defaults;
pub mod parser;
pub mod substitution;
pub mod validator;

pub use defaults::*;
pub use parser::*;
pub use substitution::*;
pub use validator::*;

/// Root configuration for `martd`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MartConfig {
    pub server: ServerSection,
    pub accrual: AccrualConfig,
    pub database: DatabaseConfig,
    pub worker: WorkerConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerSection {
    /// Listener address in `host:port` form
    #[serde(default = "default_server_address")]
    pub address: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            address: default_server_address(),
            request_timeout_seconds: default_request_timeout(),
            shutdown_grace_seconds: default_shutdown_grace(),
        }
    }
}

/// External accrual service
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AccrualConfig {
    /// Base URL, e.g. `http://localhost:9090`
    #[serde(default = "default_accrual_address")]
    pub address: String,
    #[serde(default = "default_accrual_timeout")]
    pub timeout_seconds: u64,
}

impl Default for AccrualConfig {
    fn default() -> Self {
        Self {
            address: default_accrual_address(),
            timeout_seconds: default_accrual_timeout(),
        }
    }
}

/// Durable store; when `uri` is unset the in-memory store is used
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: None,
            max_connections: default_max_connections(),
            connection_timeout_seconds: default_connection_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            poll_interval_seconds: default_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            token_ttl_hours: default_token_ttl_hours(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `ledger=debug,info`
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `pretty`, `json` or `compact`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Prometheus exporter port; no exporter when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
}

impl MartConfig {
    /// Apply command-line / environment overrides on top of the file values
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(address) = &overrides.server_address {
            self.server.address = address.clone();
        }
        if let Some(address) = &overrides.accrual_address {
            self.accrual.address = address.clone();
        }
        if let Some(uri) = &overrides.database_uri {
            self.database.uri = Some(uri.clone());
        }
        if let Some(secret) = &overrides.jwt_secret {
            self.auth.jwt_secret = secret.clone();
        }
        if let Some(level) = &overrides.log_level {
            self.logging.level = level.clone();
        }
        self.normalize();
    }

    /// Canonicalize address forms
    ///
    /// The accrual address gains an `http://` scheme when it has none and
    /// loses trailing slashes; an empty database URI means "no database".
    pub fn normalize(&mut self) {
        self.server.address = self.server.address.trim().to_string();
        self.accrual.address = normalize_accrual_address(&self.accrual.address);
        if self
            .database
            .uri
            .as_deref()
            .is_some_and(|uri| uri.trim().is_empty())
        {
            self.database.uri = None;
        }
    }

    /// True when a durable store is configured
    pub fn uses_database(&self) -> bool {
        self.database.uri.is_some()
    }
}

/// Values supplied outside the config file (CLI flags and their env vars)
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub server_address: Option<String>,
    pub accrual_address: Option<String>,
    pub database_uri: Option<String>,
    pub jwt_secret: Option<String>,
    pub log_level: Option<String>,
}

/// Prepend `http://` when no scheme is present and drop trailing slashes
pub fn normalize_accrual_address(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() || trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}
