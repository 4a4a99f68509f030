//! Bounded ledger calls.
//!
//! Reads are awaited under a timeout and may be dropped on cancellation.
//! Writes run on their own task so a cancelled or timed-out request never
//! leaves a dispatched write half-applied.

use std::future::Future;
use std::time::Duration;

use crate::domain::quota::QuotaError;
use crate::ports::LedgerError;

/// Awaits a read under `timeout`.
pub(crate) async fn bounded<T, F>(timeout: Duration, fut: F) -> Result<T, LedgerError>
where
    F: Future<Output = Result<T, LedgerError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(LedgerError::Timeout),
    }
}

/// Spawns a write and waits up to `timeout` for it. The write keeps running
/// if the wait is abandoned.
pub(crate) async fn detached<T, F>(
    timeout: Duration,
    operation: &'static str,
    fut: F,
) -> Result<T, LedgerError>
where
    F: Future<Output = Result<T, LedgerError>> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(fut);
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(LedgerError::Unavailable(format!(
            "{} task failed: {}",
            operation, join_err
        ))),
        Err(_) => Err(LedgerError::Timeout),
    }
}

/// Folds a ledger failure into the caller-facing error.
pub(crate) fn unavailable(operation: &str, err: LedgerError) -> QuotaError {
    tracing::error!(operation, error = %err, "quota ledger call failed");
    QuotaError::ledger_unavailable(format!("{} failed", operation))
}
