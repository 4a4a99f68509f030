//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `TIERED_QUOTA` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use tiered_quota::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {:?}", config.server.socket_addr());
//! ```

mod auth;
mod database;
mod error;
mod features;
mod quota;
mod server;

pub use auth::{AuthConfig, DevToken};
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use features::FeatureFlags;
pub use quota::QuotaConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Quota limits, abuse heuristic and ledger tunables
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Admin key and development tokens
    #[serde(default)]
    pub auth: AuthConfig,

    /// Feature flags
    #[serde(default)]
    pub features: FeatureFlags,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `TIERED_QUOTA` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `TIERED_QUOTA__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `TIERED_QUOTA__QUOTA__DAILY_LIMIT=5` -> `quota.daily_limit = 5`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Required environment variables are missing
    /// - Values cannot be parsed into expected types
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("TIERED_QUOTA")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.quota.validate()?;
        self.database.validate(self.quota.ledger_timeout())?;
        self.auth.validate(&self.server.environment)?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to ensure tests don't run in parallel (env vars are global)
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const TOUCHED: &[&str] = &[
        "TIERED_QUOTA__DATABASE__URL",
        "TIERED_QUOTA__SERVER__PORT",
        "TIERED_QUOTA__SERVER__ENVIRONMENT",
        "TIERED_QUOTA__QUOTA__DAILY_LIMIT",
        "TIERED_QUOTA__QUOTA__LEDGER_TIMEOUT_MS",
        "TIERED_QUOTA__DATABASE__ACQUIRE_TIMEOUT_MS",
        "TIERED_QUOTA__QUOTA__FINGERPRINT_SECRET",
        "TIERED_QUOTA__AUTH__DEV_TOKENS",
        "TIERED_QUOTA__FEATURES__ENABLE_ABUSE_DETECTION",
    ];

    fn set_minimal_env() {
        env::set_var("TIERED_QUOTA__DATABASE__URL", "postgresql://test@localhost/test");
    }

    fn clear_env() {
        for key in TOUCHED {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.database.url, "postgresql://test@localhost/test");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_apply_to_missing_sections() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.environment, Environment::Development);
        assert_eq!(config.quota.daily_limit, 3);
        assert_eq!(config.quota.anonymous_limit, 3);
        assert!(config.features.enable_abuse_detection);
        assert!(config.auth.admin_api_key.is_none());
    }

    #[test]
    fn test_nested_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("TIERED_QUOTA__SERVER__PORT", "3000");
        env::set_var("TIERED_QUOTA__QUOTA__DAILY_LIMIT", "7");
        env::set_var("TIERED_QUOTA__QUOTA__FINGERPRINT_SECRET", "pepper");
        env::set_var("TIERED_QUOTA__FEATURES__ENABLE_ABUSE_DETECTION", "false");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.quota.daily_limit, 7);
        assert!(config.quota.fingerprint_secret.is_some());
        assert!(!config.features.enable_abuse_detection);
    }

    #[test]
    fn test_production_rejects_dev_tokens() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("TIERED_QUOTA__SERVER__ENVIRONMENT", "production");
        env::set_var("TIERED_QUOTA__AUTH__DEV_TOKENS", "alpha=user-1");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert!(config.is_production());
        assert_eq!(config.validate(), Err(ValidationError::DevTokensInProduction));
    }

    #[test]
    fn test_pool_wait_must_fit_ledger_timeout() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("TIERED_QUOTA__QUOTA__LEDGER_TIMEOUT_MS", "1000");
        env::set_var("TIERED_QUOTA__DATABASE__ACQUIRE_TIMEOUT_MS", "5000");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.database.acquire_timeout_ms, Some(5000));
        assert_eq!(config.validate(), Err(ValidationError::AcquireTimeoutOutOfRange));
    }

    #[test]
    fn test_missing_database_url_fails_to_load() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        assert!(AppConfig::load().is_err());
    }
}
