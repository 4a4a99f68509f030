//! AbuseDetector - flags IPs that churn through anonymous identities.
//!
//! The per-identity quota sees every fresh fingerprint as a first request.
//! This pass looks across identities instead: when one IP has produced more
//! than `fingerprint_threshold` distinct anonymous identity keys within the
//! lookback window, the current identity is blocked.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::fingerprint::UNKNOWN_IP;
use crate::domain::quota::MeteredPolicy;
use crate::ports::{Clock, UsageLedger};

use super::ledger_call::bounded;

/// Stored reason for heuristic blocks. Never sent to callers.
pub const MULTIPLE_FINGERPRINTS_REASON: &str = "Multiple fingerprints from same IP";

/// Tunables for the detector.
#[derive(Debug, Clone, Copy)]
pub struct AbuseSettings {
    pub fingerprint_threshold: usize,
    pub lookback_hours: i64,
    pub ledger_timeout: Duration,
}

impl Default for AbuseSettings {
    fn default() -> Self {
        Self {
            fingerprint_threshold: 10,
            lookback_hours: 24,
            ledger_timeout: Duration::from_millis(2000),
        }
    }
}

/// Outcome of an abuse check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbuseVerdict {
    /// Heuristic does not apply to this caller.
    Skipped,
    Clean { distinct_identities: usize },
    Blocked { distinct_identities: usize },
}

impl AbuseVerdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, AbuseVerdict::Blocked { .. })
    }
}

/// Cross-identity heuristic over the usage ledger.
pub struct AbuseDetector {
    ledger: Arc<dyn UsageLedger>,
    clock: Arc<dyn Clock>,
    settings: AbuseSettings,
}

impl AbuseDetector {
    pub fn new(ledger: Arc<dyn UsageLedger>, clock: Arc<dyn Clock>, settings: AbuseSettings) -> Self {
        Self {
            ledger,
            clock,
            settings,
        }
    }

    /// Checks the caller's IP and blocks the current identity on a hit.
    ///
    /// Ledger failures skip the check; the quota itself has already been
    /// enforced by the time this runs.
    pub async fn inspect(&self, policy: &MeteredPolicy) -> AbuseVerdict {
        if !policy.is_anonymous() || policy.client_ip == UNKNOWN_IP {
            return AbuseVerdict::Skipped;
        }

        let now = self.clock.now();
        let since = now.minus_hours(self.settings.lookback_hours);
        let rows = match bounded(
            self.settings.ledger_timeout,
            self.ledger.list_by_ip(&policy.client_ip, since),
        )
        .await
        {
            Ok(rows) => rows,
            Err(err) => {
                tracing::error!(error = %err, "abuse check skipped, ledger unavailable");
                return AbuseVerdict::Skipped;
            }
        };

        let mut identities: HashSet<&str> = rows
            .iter()
            .filter(|r| r.is_anonymous())
            .map(|r| r.identity_key.as_str())
            .collect();
        identities.insert(policy.identity_key.as_str());
        let distinct_identities = identities.len();

        if distinct_identities <= self.settings.fingerprint_threshold {
            return AbuseVerdict::Clean { distinct_identities };
        }

        tracing::warn!(
            identity_key = %policy.identity_key,
            distinct_identities,
            threshold = self.settings.fingerprint_threshold,
            "suspicious activity, blocking identity"
        );
        tracing::debug!(ip = %policy.client_ip, "suspicious source address");

        if let Err(err) = bounded(
            self.settings.ledger_timeout,
            self.ledger
                .mark_blocked(&policy.identity_key, MULTIPLE_FINGERPRINTS_REASON, now),
        )
        .await
        {
            tracing::error!(identity_key = %policy.identity_key, error = %err, "failed to persist block");
        }

        AbuseVerdict::Blocked { distinct_identities }
    }
}
