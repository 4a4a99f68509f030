//! Quota Policy Resolver.
//!
//! Maps a [`Caller`] to the identity key, limit and window that govern it.
//!
//! | Tier | Identity key | Window | Limit |
//! |------|--------------|--------|-------|
//! | Unlimited | `user_<id>` | none | bypasses the ledger |
//! | DailyLimited | `user_<id>` | next UTC midnight | `daily_limit` |
//! | LifetimeLimited | fingerprint composite key | never resets | `anonymous_limit` |

use crate::domain::fingerprint::{ClientSignals, Fingerprint, FingerprintHasher};
use crate::domain::foundation::{Timestamp, UserId, ValidationError};

use super::{Caller, QuotaTier};

/// Prefix of identity keys belonging to verified users.
pub const USER_KEY_PREFIX: &str = "user_";

/// Builds the identity key of a verified user.
pub fn user_identity_key(user_id: &UserId) -> String {
    format!("{}{}", USER_KEY_PREFIX, user_id.as_str())
}

/// Returns true if the identity key names a verified user.
pub fn is_user_identity_key(key: &str) -> bool {
    key.starts_with(USER_KEY_PREFIX)
}

/// Time span over which usage accumulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaWindow {
    /// Resets at the given instant.
    Daily { reset_at: Timestamp },
    /// Never resets.
    Lifetime,
}

impl QuotaWindow {
    /// Boundary stored on ledger rows; the far-future sentinel for lifetime windows.
    pub fn boundary(&self) -> Timestamp {
        match self {
            QuotaWindow::Daily { reset_at } => *reset_at,
            QuotaWindow::Lifetime => Timestamp::lifetime_sentinel(),
        }
    }

    /// Reset instant worth reporting to the caller, absent for lifetime windows.
    pub fn reported_reset(&self) -> Option<Timestamp> {
        match self {
            QuotaWindow::Daily { reset_at } => Some(*reset_at),
            QuotaWindow::Lifetime => None,
        }
    }

    pub fn is_lifetime(&self) -> bool {
        matches!(self, QuotaWindow::Lifetime)
    }
}

/// Concrete policy for a metered caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeteredPolicy {
    pub tier: QuotaTier,
    pub identity_key: String,
    pub limit: u32,
    pub window: QuotaWindow,
    /// Resolved client IP recorded on new ledger rows.
    pub client_ip: String,
    /// Hashed normalized user agent recorded on new ledger rows.
    pub user_agent_hash: String,
}

impl MeteredPolicy {
    /// True when the abuse heuristic applies to this caller.
    pub fn is_anonymous(&self) -> bool {
        self.tier == QuotaTier::LifetimeLimited
    }
}

/// Resolved policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaPolicy {
    Unlimited { identity_key: String },
    Metered(MeteredPolicy),
}

impl QuotaPolicy {
    pub fn tier(&self) -> QuotaTier {
        match self {
            QuotaPolicy::Unlimited { .. } => QuotaTier::Unlimited,
            QuotaPolicy::Metered(policy) => policy.tier,
        }
    }

    pub fn identity_key(&self) -> &str {
        match self {
            QuotaPolicy::Unlimited { identity_key } => identity_key,
            QuotaPolicy::Metered(policy) => &policy.identity_key,
        }
    }
}

/// Per-tier limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    pub daily_limit: u32,
    pub anonymous_limit: u32,
}

impl QuotaLimits {
    pub fn new(daily_limit: u32, anonymous_limit: u32) -> Result<Self, ValidationError> {
        if daily_limit == 0 {
            return Err(ValidationError::out_of_range("daily_limit", 1, u32::MAX as i64, 0));
        }
        if anonymous_limit == 0 {
            return Err(ValidationError::out_of_range("anonymous_limit", 1, u32::MAX as i64, 0));
        }
        Ok(Self {
            daily_limit,
            anonymous_limit,
        })
    }
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            daily_limit: 3,
            anonymous_limit: 3,
        }
    }
}

/// Maps callers to policies.
#[derive(Debug, Clone)]
pub struct PolicyResolver {
    limits: QuotaLimits,
    hasher: FingerprintHasher,
}

impl PolicyResolver {
    pub fn new(limits: QuotaLimits, hasher: FingerprintHasher) -> Self {
        Self { limits, hasher }
    }

    pub fn limits(&self) -> QuotaLimits {
        self.limits
    }

    /// Resolves the policy for `caller` at `now`.
    pub fn resolve(&self, caller: &Caller, signals: &ClientSignals, now: Timestamp) -> QuotaPolicy {
        match (caller.tier(), caller) {
            (QuotaTier::Unlimited, Caller::Verified(principal)) => QuotaPolicy::Unlimited {
                identity_key: user_identity_key(&principal.user_id),
            },
            (QuotaTier::DailyLimited, Caller::Verified(principal)) => {
                QuotaPolicy::Metered(MeteredPolicy {
                    tier: QuotaTier::DailyLimited,
                    identity_key: user_identity_key(&principal.user_id),
                    limit: self.limits.daily_limit,
                    window: QuotaWindow::Daily {
                        reset_at: now.next_utc_midnight(),
                    },
                    client_ip: signals.resolve_ip_string(),
                    user_agent_hash: Fingerprint::generate(signals, &self.hasher, now)
                        .user_agent_hash,
                })
            }
            _ => self.lifetime_policy(signals, now),
        }
    }

    fn lifetime_policy(&self, signals: &ClientSignals, now: Timestamp) -> QuotaPolicy {
        let fingerprint = Fingerprint::generate(signals, &self.hasher, now);
        QuotaPolicy::Metered(MeteredPolicy {
            tier: QuotaTier::LifetimeLimited,
            identity_key: fingerprint.composite_key,
            limit: self.limits.anonymous_limit,
            window: QuotaWindow::Lifetime,
            client_ip: fingerprint.ip,
            user_agent_hash: fingerprint.user_agent_hash,
        })
    }
}
