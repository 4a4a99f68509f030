//! Quota handlers.
//!
//! - `RateLimitEnforcer` - per-request admit/reject against the ledger
//! - `AbuseDetector` - blocks IPs churning anonymous identities
//! - `QuotaGuard` - enforcer plus detector, the entry point for requests
//! - `QuotaStatusHandler` - read-only quota position
//! - `UnblockIdentityHandler`, `ResetUsageHandler` - operator actions
//! - `RetentionSweeper` - background purge of old rows

mod abuse_detector;
mod enforcer;
mod guard;
mod ledger_call;
mod operator;
mod quota_status;
mod retention_sweeper;

pub use abuse_detector::{AbuseDetector, AbuseSettings, AbuseVerdict, MULTIPLE_FINGERPRINTS_REASON};
pub use enforcer::{Enforcement, EnforcerSettings, QuotaRequest, RateLimitEnforcer};
pub use guard::QuotaGuard;
pub use operator::{
    OperatorResult, ResetUsageCommand, ResetUsageHandler, UnblockIdentityCommand,
    UnblockIdentityHandler,
};
pub use quota_status::{QuotaStatusHandler, QuotaStatusQuery, QuotaStatusResult};
pub use retention_sweeper::RetentionSweeper;
