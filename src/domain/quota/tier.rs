//! Caller classification and access tiers.

use serde::Serialize;
use std::fmt;

use crate::domain::foundation::Principal;

/// Access tier deciding which quota policy applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaTier {
    /// Verified and unlocked; never metered.
    Unlimited,
    /// Verified without unlock; allowance resets every UTC midnight.
    DailyLimited,
    /// Anonymous or unrecognized; allowance never resets.
    LifetimeLimited,
}

impl QuotaTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaTier::Unlimited => "unlimited",
            QuotaTier::DailyLimited => "daily_limited",
            QuotaTier::LifetimeLimited => "lifetime_limited",
        }
    }

    /// Returns true if requests on this tier touch the ledger.
    pub fn is_metered(&self) -> bool {
        !matches!(self, QuotaTier::Unlimited)
    }
}

impl fmt::Display for QuotaTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who is making the request, as established by the identity middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// Credential verified.
    Verified(Principal),
    /// No credential presented.
    Anonymous,
    /// Credential presented but could not be verified.
    Unrecognized { reason: String },
}

impl Caller {
    pub fn unrecognized(reason: impl Into<String>) -> Self {
        Caller::Unrecognized {
            reason: reason.into(),
        }
    }

    /// Maps the caller to a tier. Anything not positively verified lands on
    /// the most restrictive tier.
    pub fn tier(&self) -> QuotaTier {
        match self {
            Caller::Verified(principal) if principal.unlocked => QuotaTier::Unlimited,
            Caller::Verified(_) => QuotaTier::DailyLimited,
            Caller::Anonymous | Caller::Unrecognized { .. } => QuotaTier::LifetimeLimited,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Caller::Verified(_))
    }
}
