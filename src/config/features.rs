//! Feature flags configuration

use serde::Deserialize;

/// Feature flags for enabling/disabling functionality
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureFlags {
    /// Block IPs that churn anonymous identities
    #[serde(default = "default_true")]
    pub enable_abuse_detection: bool,

    /// Run the background retention sweep
    #[serde(default = "default_true")]
    pub enable_retention_sweep: bool,

    /// Show storage error text in 503 bodies (disable in production!)
    #[serde(default)]
    pub verbose_errors: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_abuse_detection: true,
            enable_retention_sweep: true,
            verbose_errors: false,
        }
    }
}

fn default_true() -> bool {
    true
}
