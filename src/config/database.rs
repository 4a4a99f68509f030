//! Ledger store (PostgreSQL) configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Connection pool settings for the usage ledger.
///
/// Every ledger call runs under `quota.ledger_timeout_ms`, so waiting for a
/// pooled connection never takes longer than that deadline.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Pool acquire wait in milliseconds. Unset means the ledger timeout.
    #[serde(default)]
    pub acquire_timeout_ms: Option<u64>,

    /// Seconds an idle connection is kept
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Seconds before a connection is recycled
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_secs: u64,

    /// Apply `migrations/` on startup
    #[serde(default)]
    pub run_migrations: bool,
}

impl DatabaseConfig {
    /// Pool acquire wait, capped at the ledger deadline.
    pub fn acquire_timeout(&self, ledger_timeout: Duration) -> Duration {
        match self.acquire_timeout_ms {
            Some(ms) => Duration::from_millis(ms).min(ledger_timeout),
            None => ledger_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    /// Validate against the ledger deadline the pool has to honour.
    pub fn validate(&self, ledger_timeout: Duration) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::MissingRequired("DATABASE_URL"));
        }
        if !self.url.starts_with("postgres://") && !self.url.starts_with("postgresql://") {
            return Err(ValidationError::InvalidDatabaseUrl);
        }
        if self.min_connections > self.max_connections {
            return Err(ValidationError::InvalidPoolSize);
        }
        if self.max_connections > 100 {
            return Err(ValidationError::PoolSizeTooLarge);
        }
        if let Some(ms) = self.acquire_timeout_ms {
            if ms == 0 || Duration::from_millis(ms) > ledger_timeout {
                return Err(ValidationError::AcquireTimeoutOutOfRange);
            }
        }
        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            acquire_timeout_ms: None,
            idle_timeout_secs: default_idle_timeout(),
            max_lifetime_secs: default_max_lifetime(),
            run_migrations: false,
        }
    }
}

fn default_min_connections() -> u32 {
    2
}

fn default_max_connections() -> u32 {
    20
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_max_lifetime() -> u64 {
    1800
}
