//! Usage ledger port - durable per-identity usage records.
//!
//! The ledger is the only shared mutable state of the quota engine. All
//! admission correctness hinges on two guarantees implementations must give:
//!
//! 1. **At most one row** per `(identity_key, endpoint, window_reset_at)`.
//!    A second `create` for the same triple reports `AlreadyExists`.
//! 2. **Atomic conditional increment.** `increment_if_below` checks the limit
//!    and bumps the count as one step, so two concurrent callers at
//!    `limit - 1` cannot both succeed. Operations on different keys never
//!    block each other.
//!
//! A block belongs to the identity, not to a window row: it is recorded even
//! when the identity has no rows yet, and every row created for a blocked
//! identity starts blocked. Only `clear_block` lifts it.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::{Timestamp, UsageRecordId};
use crate::domain::quota::{NewUsageRecord, UsageRecord};

/// Port for the persisted usage ledger.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Fetches the row for a caller's window, if any.
    async fn get_by_key(
        &self,
        identity_key: &str,
        endpoint: &str,
        window_reset_at: Timestamp,
    ) -> Result<Option<UsageRecord>, LedgerError>;

    /// Inserts a first-request row with `usage_count = 1`. The row inherits a
    /// standing block on its identity.
    async fn create(&self, record: NewUsageRecord) -> Result<CreateOutcome, LedgerError>;

    /// Increments `usage_count` if it is still below `limit`.
    async fn increment_if_below(
        &self,
        id: UsageRecordId,
        limit: u32,
        now: Timestamp,
    ) -> Result<IncrementOutcome, LedgerError>;

    /// Lists rows recorded from `ip` created at or after `since`.
    async fn list_by_ip(&self, ip: &str, since: Timestamp) -> Result<Vec<UsageRecord>, LedgerError>;

    /// Blocks `identity_key` and every row it owns. Returns the rows touched.
    async fn mark_blocked(
        &self,
        identity_key: &str,
        reason: &str,
        now: Timestamp,
    ) -> Result<u64, LedgerError>;

    /// True if `identity_key` is under a standing block.
    async fn is_blocked(&self, identity_key: &str) -> Result<bool, LedgerError>;

    /// Lifts the block on `identity_key` and its rows. Returns the rows touched.
    async fn clear_block(&self, identity_key: &str, now: Timestamp) -> Result<u64, LedgerError>;

    /// Zeroes usage on the live windows (`window_reset_at > now`) of an
    /// identity and endpoint. Returns the rows touched.
    async fn reset_usage(
        &self,
        identity_key: &str,
        endpoint: &str,
        now: Timestamp,
    ) -> Result<u64, LedgerError>;

    /// Deletes unblocked rows created before `cutoff`. Returns the rows deleted.
    async fn purge_older_than(&self, cutoff: Timestamp) -> Result<u64, LedgerError>;
}

/// Result of a create attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(UsageRecordId),
    /// The row was created but the identity is blocked.
    CreatedBlocked(UsageRecordId),
    /// A concurrent request created the row first.
    AlreadyExists,
}

/// Result of a conditional increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// New count after the increment.
    Incremented(u32),
    /// The row was already at its limit; carries the current count.
    LimitReached(u32),
}

/// Ledger failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("ledger operation timed out")]
    Timeout,

    #[error("ledger record not found")]
    NotFound,

    #[error("ledger record corrupt: {0}")]
    Corrupt(String),
}

impl LedgerError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Returns true if a retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_) | LedgerError::Timeout)
    }

    /// Returns true if a failed write may be sent again. A timed-out write
    /// may still land, so only errors reported by the ledger itself qualify.
    pub fn is_retryable_write(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_))
    }
}
