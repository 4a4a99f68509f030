//! QuotaStatusHandler - Query handler reporting quota without consuming it.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::fingerprint::ClientSignals;
use crate::domain::quota::{
    Caller, Endpoint, PolicyResolver, QuotaError, QuotaPolicy, QuotaSnapshot, QuotaTier,
    QuotaUsage,
};
use crate::ports::{Clock, UsageLedger};

use super::ledger_call::{bounded, unavailable};

/// Query for the caller's current position on an endpoint.
#[derive(Debug, Clone)]
pub struct QuotaStatusQuery {
    pub caller: Caller,
    pub signals: ClientSignals,
    pub endpoint: Endpoint,
}

/// Result of a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaStatusResult {
    pub tier: QuotaTier,
    pub snapshot: QuotaSnapshot,
    pub blocked: bool,
}

/// Handler for quota status queries.
pub struct QuotaStatusHandler {
    ledger: Arc<dyn UsageLedger>,
    resolver: PolicyResolver,
    clock: Arc<dyn Clock>,
    ledger_timeout: Duration,
}

impl QuotaStatusHandler {
    pub fn new(
        ledger: Arc<dyn UsageLedger>,
        resolver: PolicyResolver,
        clock: Arc<dyn Clock>,
        ledger_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            resolver,
            clock,
            ledger_timeout,
        }
    }

    pub async fn handle(&self, query: QuotaStatusQuery) -> Result<QuotaStatusResult, QuotaError> {
        let now = self.clock.now();
        let policy = match self.resolver.resolve(&query.caller, &query.signals, now) {
            QuotaPolicy::Unlimited { .. } => {
                return Ok(QuotaStatusResult {
                    tier: QuotaTier::Unlimited,
                    snapshot: QuotaSnapshot::Unlimited,
                    blocked: false,
                })
            }
            QuotaPolicy::Metered(policy) => policy,
        };

        let record = bounded(
            self.ledger_timeout,
            self.ledger.get_by_key(
                &policy.identity_key,
                query.endpoint.as_str(),
                policy.window.boundary(),
            ),
        )
        .await
        .map_err(|e| unavailable("fetch usage record", e))?;

        let (used, limit, blocked) = match &record {
            Some(r) => (r.usage_count, r.limit, r.is_blocked),
            None => {
                let blocked = bounded(self.ledger_timeout, self.ledger.is_blocked(&policy.identity_key))
                    .await
                    .map_err(|e| unavailable("read identity block", e))?;
                (0, policy.limit, blocked)
            }
        };

        Ok(QuotaStatusResult {
            tier: policy.tier,
            snapshot: QuotaSnapshot::Metered(QuotaUsage {
                tier: policy.tier,
                limit,
                used,
                reset_at: policy.window.reported_reset(),
            }),
            blocked,
        })
    }
}
