//! Errors surfaced by quota evaluation.

use thiserror::Error;

use crate::domain::foundation::ValidationError;

/// Failures that prevent a quota decision from being made.
///
/// Storage errors are folded into `LedgerUnavailable` so no backend detail
/// reaches a caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuotaError {
    #[error("quota ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("invalid quota request: {0}")]
    Invalid(#[from] ValidationError),
}

impl QuotaError {
    pub fn ledger_unavailable(message: impl Into<String>) -> Self {
        Self::LedgerUnavailable(message.into())
    }
}
