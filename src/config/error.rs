//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Server host must be an IP address")]
    InvalidHost,

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Pool acquire timeout must be positive and within the ledger timeout")]
    AcquireTimeoutOutOfRange,

    #[error("Quota value out of range: {0}")]
    InvalidQuotaValue(&'static str),

    #[error("Invalid dev token entry: {0}")]
    InvalidDevToken(String),

    #[error("Dev tokens are not allowed in production")]
    DevTokensInProduction,

    #[error("Admin API key must be at least {0} characters")]
    AdminKeyTooShort(usize),
}
