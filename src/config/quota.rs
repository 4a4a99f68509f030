//! Quota engine configuration

use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Ten years; keeps cutoff arithmetic well inside chrono's range.
const MAX_RETENTION_DAYS: i64 = 3650;

/// Thirty days.
const MAX_ABUSE_LOOKBACK_HOURS: i64 = 720;

/// Limits, abuse heuristic and ledger tunables
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaConfig {
    /// Requests per day for signed-in callers without an unlock
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,

    /// Lifetime requests for anonymous and unrecognized callers
    #[serde(default = "default_anonymous_limit")]
    pub anonymous_limit: u32,

    /// Distinct anonymous identities per IP before blocking
    #[serde(default = "default_abuse_fingerprint_threshold")]
    pub abuse_fingerprint_threshold: usize,

    /// How far back the abuse heuristic looks, in hours
    #[serde(default = "default_abuse_lookback_hours")]
    pub abuse_lookback_hours: i64,

    /// Upper bound on each ledger call, in milliseconds
    #[serde(default = "default_ledger_timeout_ms")]
    pub ledger_timeout_ms: u64,

    /// Age after which unblocked ledger rows are purged
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Seconds between retention sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Extra attempts for a failed post-admit increment
    #[serde(default)]
    pub increment_retry_attempts: u32,

    /// Pepper for fingerprint digests; plain SHA-256 when unset
    #[serde(default)]
    pub fingerprint_secret: Option<SecretString>,
}

impl QuotaConfig {
    /// Get ledger timeout as Duration
    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_timeout_ms)
    }

    /// Get sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate quota configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.daily_limit == 0 {
            return Err(ValidationError::InvalidQuotaValue("daily_limit"));
        }
        if self.anonymous_limit == 0 {
            return Err(ValidationError::InvalidQuotaValue("anonymous_limit"));
        }
        if self.abuse_fingerprint_threshold == 0 {
            return Err(ValidationError::InvalidQuotaValue("abuse_fingerprint_threshold"));
        }
        if self.abuse_lookback_hours <= 0 || self.abuse_lookback_hours > MAX_ABUSE_LOOKBACK_HOURS {
            return Err(ValidationError::InvalidQuotaValue("abuse_lookback_hours"));
        }
        if self.ledger_timeout_ms == 0 || self.ledger_timeout_ms > 60_000 {
            return Err(ValidationError::InvalidQuotaValue("ledger_timeout_ms"));
        }
        if self.retention_days <= 0 || self.retention_days > MAX_RETENTION_DAYS {
            return Err(ValidationError::InvalidQuotaValue("retention_days"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidQuotaValue("sweep_interval_secs"));
        }
        if self.increment_retry_attempts > 5 {
            return Err(ValidationError::InvalidQuotaValue("increment_retry_attempts"));
        }
        Ok(())
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            anonymous_limit: default_anonymous_limit(),
            abuse_fingerprint_threshold: default_abuse_fingerprint_threshold(),
            abuse_lookback_hours: default_abuse_lookback_hours(),
            ledger_timeout_ms: default_ledger_timeout_ms(),
            retention_days: default_retention_days(),
            sweep_interval_secs: default_sweep_interval_secs(),
            increment_retry_attempts: 0,
            fingerprint_secret: None,
        }
    }
}

fn default_daily_limit() -> u32 {
    3
}

fn default_anonymous_limit() -> u32 {
    3
}

fn default_abuse_fingerprint_threshold() -> usize {
    10
}

fn default_abuse_lookback_hours() -> i64 {
    24
}

fn default_ledger_timeout_ms() -> u64 {
    2000
}

fn default_retention_days() -> i64 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    3600
}
