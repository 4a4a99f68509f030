//! Outcomes of a quota evaluation.

use serde::Serialize;

use crate::domain::foundation::{ErrorCode, Timestamp};

use super::QuotaTier;

/// Externally reported message for blocked identities.
pub const BLOCKED_MESSAGE: &str = "Your access has been blocked due to suspicious activity";

const DAILY_LIMIT_MESSAGE: &str = "You've used all your free daily requests. Please activate a referral code for unlimited access or try again tomorrow.";

/// Usage figures reported on headers and bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaUsage {
    pub tier: QuotaTier,
    pub limit: u32,
    pub used: u32,
    /// Absent for lifetime windows.
    pub reset_at: Option<Timestamp>,
}

impl QuotaUsage {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }
}

/// Quota position after a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaSnapshot {
    Unlimited,
    Metered(QuotaUsage),
}

impl QuotaSnapshot {
    pub fn usage(&self) -> Option<&QuotaUsage> {
        match self {
            QuotaSnapshot::Unlimited => None,
            QuotaSnapshot::Metered(usage) => Some(usage),
        }
    }
}

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Resetting window exhausted; retry after `reset_at`.
    DailyLimitExceeded { used: u32, limit: u32, reset_at: Timestamp },
    /// Lifetime window exhausted; only signing in helps.
    TrialLimitExceeded { used: u32, limit: u32 },
    /// Identity is blocked. Carries no counts.
    Blocked,
}

impl RejectReason {
    pub fn code(&self) -> ErrorCode {
        match self {
            RejectReason::DailyLimitExceeded { .. } => ErrorCode::DailyLimitExceeded,
            RejectReason::TrialLimitExceeded { .. } => ErrorCode::TrialLimitExceeded,
            RejectReason::Blocked => ErrorCode::AccessBlocked,
        }
    }

    pub fn message(&self) -> String {
        match self {
            RejectReason::DailyLimitExceeded { .. } => DAILY_LIMIT_MESSAGE.to_string(),
            RejectReason::TrialLimitExceeded { limit, .. } => format!(
                "You've used all {} free requests. Please sign in for unlimited access.",
                limit
            ),
            RejectReason::Blocked => BLOCKED_MESSAGE.to_string(),
        }
    }

    /// Usage to advertise on rate-limit headers. Blocked rejections reveal nothing.
    pub fn usage(&self) -> Option<QuotaUsage> {
        match *self {
            RejectReason::DailyLimitExceeded { used, limit, reset_at } => Some(QuotaUsage {
                tier: QuotaTier::DailyLimited,
                limit,
                used,
                reset_at: Some(reset_at),
            }),
            RejectReason::TrialLimitExceeded { used, limit } => Some(QuotaUsage {
                tier: QuotaTier::LifetimeLimited,
                limit,
                used,
                reset_at: None,
            }),
            RejectReason::Blocked => None,
        }
    }

    /// Builds the limit-exceeded reason matching the usage's window.
    pub fn limit_exceeded(usage: QuotaUsage) -> Self {
        match usage.reset_at {
            Some(reset_at) => RejectReason::DailyLimitExceeded {
                used: usage.used,
                limit: usage.limit,
                reset_at,
            },
            None => RejectReason::TrialLimitExceeded {
                used: usage.used,
                limit: usage.limit,
            },
        }
    }
}

/// Admit or Reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Admit(QuotaSnapshot),
    Reject(RejectReason),
}

impl QuotaDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, QuotaDecision::Admit(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, QuotaDecision::Reject(_))
    }
}
