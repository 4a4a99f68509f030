//! Operator command handlers: unblock an identity, reset its usage.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::foundation::ValidationError;
use crate::domain::quota::{Endpoint, QuotaError};
use crate::ports::{Clock, UsageLedger};

use super::ledger_call::{bounded, unavailable};

fn require_identity_key(key: &str) -> Result<(), QuotaError> {
    if key.trim().is_empty() {
        return Err(ValidationError::empty_field("identity_key").into());
    }
    Ok(())
}

/// Command to clear a block on every row of an identity.
#[derive(Debug, Clone)]
pub struct UnblockIdentityCommand {
    pub identity_key: String,
}

/// Rows touched by an operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorResult {
    pub rows_affected: u64,
}

/// Handler for unblocking identities. The only way a block is ever lifted.
pub struct UnblockIdentityHandler {
    ledger: Arc<dyn UsageLedger>,
    clock: Arc<dyn Clock>,
    ledger_timeout: Duration,
}

impl UnblockIdentityHandler {
    pub fn new(ledger: Arc<dyn UsageLedger>, clock: Arc<dyn Clock>, ledger_timeout: Duration) -> Self {
        Self {
            ledger,
            clock,
            ledger_timeout,
        }
    }

    pub async fn handle(&self, cmd: UnblockIdentityCommand) -> Result<OperatorResult, QuotaError> {
        require_identity_key(&cmd.identity_key)?;

        let rows_affected = bounded(
            self.ledger_timeout,
            self.ledger.clear_block(&cmd.identity_key, self.clock.now()),
        )
        .await
        .map_err(|e| unavailable("clear block", e))?;

        tracing::info!(identity_key = %cmd.identity_key, rows_affected, "identity unblocked by operator");
        Ok(OperatorResult { rows_affected })
    }
}

/// Command to zero an identity's usage in its live window.
#[derive(Debug, Clone)]
pub struct ResetUsageCommand {
    pub identity_key: String,
    pub endpoint: Endpoint,
}

/// Handler for usage resets.
pub struct ResetUsageHandler {
    ledger: Arc<dyn UsageLedger>,
    clock: Arc<dyn Clock>,
    ledger_timeout: Duration,
}

impl ResetUsageHandler {
    pub fn new(ledger: Arc<dyn UsageLedger>, clock: Arc<dyn Clock>, ledger_timeout: Duration) -> Self {
        Self {
            ledger,
            clock,
            ledger_timeout,
        }
    }

    pub async fn handle(&self, cmd: ResetUsageCommand) -> Result<OperatorResult, QuotaError> {
        require_identity_key(&cmd.identity_key)?;

        let rows_affected = bounded(
            self.ledger_timeout,
            self.ledger
                .reset_usage(&cmd.identity_key, cmd.endpoint.as_str(), self.clock.now()),
        )
        .await
        .map_err(|e| unavailable("reset usage", e))?;

        tracing::info!(
            identity_key = %cmd.identity_key,
            endpoint = %cmd.endpoint,
            rows_affected,
            "usage reset by operator"
        );
        Ok(OperatorResult { rows_affected })
    }
}
