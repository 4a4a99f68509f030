//! Quota domain.
//!
//! Tier classification, policy resolution, ledger rows and the pure rules
//! that decide admission. Nothing here performs I/O; the enforcer in the
//! application layer pairs these rules with a [`UsageLedger`] port.
//!
//! [`UsageLedger`]: crate::ports::UsageLedger

mod decision;
mod endpoint;
mod errors;
mod policy;
mod record;
mod tier;

pub use decision::{QuotaDecision, QuotaSnapshot, QuotaUsage, RejectReason, BLOCKED_MESSAGE};
pub use endpoint::Endpoint;
pub use errors::QuotaError;
pub use policy::{
    is_user_identity_key, user_identity_key, MeteredPolicy, PolicyResolver, QuotaLimits,
    QuotaPolicy, QuotaWindow, USER_KEY_PREFIX,
};
pub use record::{NewUsageRecord, RecordState, UsageRecord};
pub use tier::{Caller, QuotaTier};
