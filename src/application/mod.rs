//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain rules and coordinates between ports.
//! Request-path evaluation (`QuotaGuard`) is kept apart from read-only
//! queries and operator commands.

pub mod handlers;

pub use handlers::{
    AbuseDetector, AbuseSettings, EnforcerSettings, QuotaGuard, QuotaRequest, QuotaStatusHandler,
    QuotaStatusQuery, RateLimitEnforcer, ResetUsageCommand, ResetUsageHandler, RetentionSweeper,
    UnblockIdentityCommand, UnblockIdentityHandler,
};
