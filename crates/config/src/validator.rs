use crate::*;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("server.address is required")]
    MissingServerAddress,

    #[error("server.address '{0}' must be in host:port form")]
    InvalidServerAddress(String),

    #[error("accrual.address '{address}': {message}")]
    InvalidAccrualAddress { address: String, message: String },

    #[error("{field} must be a positive integer")]
    InvalidPositiveInteger { field: String },

    #[error("auth.jwt_secret must not be empty")]
    EmptyJwtSecret,

    #[error("Invalid log format: {0}. Must be one of: pretty, json, compact")]
    InvalidLogFormat(String),

    #[error("Environment variable placeholder left unresolved in {field}")]
    UnresolvedEnvVar { field: String },
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings.push(ValidationWarning {
            field: field.to_string(),
            message: message.to_string(),
        });
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

pub fn validate_config(config: &MartConfig) -> ValidationReport {
    let mut report = ValidationReport::new();

    validate_server(&config.server, &mut report);
    validate_accrual(&config.accrual, &mut report);
    validate_database(&config.database, &mut report);
    validate_worker(&config.worker, &mut report);
    validate_auth(&config.auth, &mut report);
    validate_logging(&config.logging, &mut report);

    report
}

fn require_positive(value: u64, field: &str, report: &mut ValidationReport) {
    if value == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: field.to_string(),
        });
    }
}

fn validate_server(server: &ServerSection, report: &mut ValidationReport) {
    let address = server.address.trim();
    if address.is_empty() {
        report.add_error(ValidationError::MissingServerAddress);
    } else {
        let well_formed = address
            .rsplit_once(':')
            .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
        if !well_formed {
            report.add_error(ValidationError::InvalidServerAddress(address.to_string()));
        }
    }

    require_positive(server.request_timeout_seconds, "server.request_timeout_seconds", report);
    require_positive(server.shutdown_grace_seconds, "server.shutdown_grace_seconds", report);
}

fn validate_accrual(accrual: &AccrualConfig, report: &mut ValidationReport) {
    if has_unresolved_env_vars(&accrual.address) {
        report.add_error(ValidationError::UnresolvedEnvVar {
            field: "accrual.address".to_string(),
        });
    } else {
        match Url::parse(&accrual.address) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {}
            Ok(url) => report.add_error(ValidationError::InvalidAccrualAddress {
                address: accrual.address.clone(),
                message: format!("unsupported scheme '{}' or missing host", url.scheme()),
            }),
            Err(e) => report.add_error(ValidationError::InvalidAccrualAddress {
                address: accrual.address.clone(),
                message: e.to_string(),
            }),
        }
    }

    require_positive(accrual.timeout_seconds, "accrual.timeout_seconds", report);
}

fn validate_database(database: &DatabaseConfig, report: &mut ValidationReport) {
    match &database.uri {
        Some(uri) if has_unresolved_env_vars(uri) => {
            report.add_error(ValidationError::UnresolvedEnvVar {
                field: "database.uri".to_string(),
            });
        }
        Some(_) => {}
        None => report.add_warning(
            "database.uri",
            "No database configured; using the in-memory store (data is lost on restart)",
        ),
    }

    require_positive(database.max_connections as u64, "database.max_connections", report);
    require_positive(
        database.connection_timeout_seconds,
        "database.connection_timeout_seconds",
        report,
    );
}

fn validate_worker(worker: &WorkerConfig, report: &mut ValidationReport) {
    require_positive(worker.poll_interval_seconds, "worker.poll_interval_seconds", report);

    if !worker.enabled {
        report.add_warning(
            "worker.enabled",
            "Reconciliation worker disabled; credit orders will never settle",
        );
    }
}

fn validate_auth(auth: &AuthConfig, report: &mut ValidationReport) {
    if auth.jwt_secret.is_empty() {
        report.add_error(ValidationError::EmptyJwtSecret);
    } else if has_unresolved_env_vars(&auth.jwt_secret) {
        report.add_error(ValidationError::UnresolvedEnvVar {
            field: "auth.jwt_secret".to_string(),
        });
    } else if auth.jwt_secret == DEFAULT_JWT_SECRET {
        report.add_warning(
            "auth.jwt_secret",
            "Using the built-in signing secret; set JWT_SECRET in production",
        );
    }

    require_positive(auth.token_ttl_hours, "auth.token_ttl_hours", report);
}

fn validate_logging(logging: &LoggingConfig, report: &mut ValidationReport) {
    if !matches!(
        logging.format.to_lowercase().as_str(),
        "pretty" | "json" | "compact"
    ) {
        report.add_error(ValidationError::InvalidLogFormat(logging.format.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_defaults_are_valid_with_warnings() {
        let report = validate_config(&MartConfig::default());
        assert!(report.is_valid(), "{:?}", report.errors);

        let fields: Vec<_> = report.warnings.iter().map(|w| w.field.as_str()).collect();
        assert!(fields.contains(&"auth.jwt_secret"));
        assert!(fields.contains(&"database.uri"));
    }

    #[test]
    fn test_bad_values_are_errors() {
        let mut config = MartConfig::default();
        config.server.address = "localhost".into();
        config.accrual.address = "ftp://accrual".into();
        config.worker.poll_interval_seconds = 0;
        config.accrual.timeout_seconds = 0;
        config.auth.jwt_secret = String::new();
        config.logging.format = "xml".into();

        let report = validate_config(&config);
        assert!(!report.is_valid());
        assert_matches!(&report.errors[0], ValidationError::InvalidServerAddress(a) if a == "localhost");
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidAccrualAddress { .. })));
        assert!(report.errors.contains(&ValidationError::InvalidPositiveInteger {
            field: "worker.poll_interval_seconds".into()
        }));
        assert!(report.errors.contains(&ValidationError::InvalidPositiveInteger {
            field: "accrual.timeout_seconds".into()
        }));
        assert!(report.errors.contains(&ValidationError::EmptyJwtSecret));
        assert!(report
            .errors
            .contains(&ValidationError::InvalidLogFormat("xml".into())));
    }

    #[test]
    fn test_unresolved_placeholder() {
        let mut config = MartConfig::default();
        config.database.uri = Some("postgres://${MART_TEST_NEVER_SET}/db".into());

        let report = validate_config(&config);
        assert_eq!(
            report.errors,
            vec![ValidationError::UnresolvedEnvVar {
                field: "database.uri".into()
            }]
        );
    }

    #[test]
    fn test_missing_server_address() {
        let mut config = MartConfig::default();
        config.server.address = "   ".into();
        let report = validate_config(&config);
        assert_eq!(report.errors, vec![ValidationError::MissingServerAddress]);
    }
}
