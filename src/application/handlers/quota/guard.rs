//! QuotaGuard - enforcer followed by the abuse heuristic.

use std::sync::Arc;

use crate::domain::quota::{QuotaDecision, QuotaError, QuotaPolicy, RejectReason};
use crate::ports::Clock;

use super::abuse_detector::AbuseDetector;
use super::enforcer::{Enforcement, QuotaRequest, RateLimitEnforcer};

/// Full admission check for one request.
///
/// The abuse detector only runs once the enforcer has admitted an anonymous
/// caller, so the current identity's row exists when it gets blocked.
pub struct QuotaGuard {
    enforcer: RateLimitEnforcer,
    detector: Option<AbuseDetector>,
}

impl QuotaGuard {
    pub fn new(enforcer: RateLimitEnforcer) -> Self {
        Self {
            enforcer,
            detector: None,
        }
    }

    pub fn with_abuse_detector(mut self, detector: AbuseDetector) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        self.enforcer.clock()
    }

    pub async fn check(&self, request: &QuotaRequest) -> Result<Enforcement, QuotaError> {
        let enforcement = self.enforcer.evaluate(request).await?;

        let (Some(detector), QuotaPolicy::Metered(policy), QuotaDecision::Admit(_)) =
            (&self.detector, &enforcement.policy, &enforcement.decision)
        else {
            return Ok(enforcement);
        };

        if detector.inspect(policy).await.is_blocked() {
            return Ok(Enforcement {
                policy: enforcement.policy.clone(),
                decision: QuotaDecision::Reject(RejectReason::Blocked),
            });
        }

        Ok(enforcement)
    }
}
