pub const DEFAULT_JWT_SECRET: &str = "change-me";

pub fn default_enabled() -> bool {
    true
}

pub fn default_server_address() -> String {
    "localhost:8080".to_string()
}

pub fn default_request_timeout() -> u64 {
    30
}

pub fn default_shutdown_grace() -> u64 {
    30
}

pub fn default_accrual_address() -> String {
    "http://localhost:9090".to_string()
}

pub fn default_accrual_timeout() -> u64 {
    10
}

pub fn default_max_connections() -> u32 {
    20
}

pub fn default_connection_timeout() -> u64 {
    30
}

pub fn default_poll_interval() -> u64 {
    10
}

pub fn default_jwt_secret() -> String {
    DEFAULT_JWT_SECRET.to_string()
}

pub fn default_token_ttl_hours() -> u64 {
    24
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_log_format() -> String {
    "pretty".to_string()
}
