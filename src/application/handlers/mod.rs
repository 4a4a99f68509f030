//! Command and query handlers.

pub mod quota;

pub use quota::{
    AbuseDetector, AbuseSettings, AbuseVerdict, Enforcement, EnforcerSettings, OperatorResult,
    QuotaGuard, QuotaRequest, QuotaStatusHandler, QuotaStatusQuery, QuotaStatusResult,
    RateLimitEnforcer, ResetUsageCommand, ResetUsageHandler, RetentionSweeper,
    UnblockIdentityCommand, UnblockIdentityHandler,
};
