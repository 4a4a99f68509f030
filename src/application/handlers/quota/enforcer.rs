//! RateLimitEnforcer - the per-request admission procedure.
//!
//! 1. Resolve the caller's policy. Unlimited callers are admitted with no
//!    ledger I/O.
//! 2. Fetch the row for `(identity_key, endpoint, window boundary)`.
//! 3. No row: create it with `usage_count = 1` and admit. A lost creation
//!    race re-reads and continues as step 4.
//! 4. Blocked row: reject. Exhausted row: reject with limit info. A row
//!    created for an identity under a standing block is rejected too, so a
//!    block survives window rollover.
//! 5. Otherwise increment atomically below the limit and admit.
//!
//! Read and create failures fail the request. A failed increment after the
//! admit decision is logged and the request is still admitted.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::fingerprint::ClientSignals;
use crate::domain::quota::{
    Caller, Endpoint, MeteredPolicy, NewUsageRecord, PolicyResolver, QuotaDecision, QuotaError,
    QuotaPolicy, QuotaSnapshot, QuotaUsage, RecordState, RejectReason, UsageRecord,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{Clock, CreateOutcome, IncrementOutcome, LedgerError, UsageLedger};

use super::ledger_call::{bounded, detached, unavailable};

/// A request to be metered.
#[derive(Debug, Clone)]
pub struct QuotaRequest {
    pub caller: Caller,
    pub signals: ClientSignals,
    pub endpoint: Endpoint,
}

/// Decision plus the policy it was made under.
#[derive(Debug, Clone)]
pub struct Enforcement {
    pub policy: QuotaPolicy,
    pub decision: QuotaDecision,
}

/// Tunables for the enforcer.
#[derive(Debug, Clone, Copy)]
pub struct EnforcerSettings {
    /// Upper bound on each ledger call.
    pub ledger_timeout: Duration,
    /// Extra attempts for a failed post-admit increment. Zero keeps the
    /// increment best-effort. Timed-out increments are never resent.
    pub increment_retry_attempts: u32,
}

impl Default for EnforcerSettings {
    fn default() -> Self {
        Self {
            ledger_timeout: Duration::from_millis(2000),
            increment_retry_attempts: 0,
        }
    }
}

/// Per-request quota decision procedure.
pub struct RateLimitEnforcer {
    ledger: Arc<dyn UsageLedger>,
    resolver: PolicyResolver,
    clock: Arc<dyn Clock>,
    settings: EnforcerSettings,
}

impl RateLimitEnforcer {
    pub fn new(
        ledger: Arc<dyn UsageLedger>,
        resolver: PolicyResolver,
        clock: Arc<dyn Clock>,
        settings: EnforcerSettings,
    ) -> Self {
        Self {
            ledger,
            resolver,
            clock,
            settings,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Evaluates one request: admit or reject.
    pub async fn evaluate(&self, request: &QuotaRequest) -> Result<Enforcement, QuotaError> {
        let now = self.clock.now();
        let policy = self.resolver.resolve(&request.caller, &request.signals, now);

        let decision = match &policy {
            QuotaPolicy::Unlimited { identity_key } => {
                tracing::debug!(identity_key = %identity_key, endpoint = %request.endpoint, "unlimited tier admitted");
                QuotaDecision::Admit(QuotaSnapshot::Unlimited)
            }
            QuotaPolicy::Metered(metered) => {
                self.evaluate_metered(metered, request.endpoint.as_str(), now)
                    .await?
            }
        };

        Ok(Enforcement { policy, decision })
    }

    async fn evaluate_metered(
        &self,
        policy: &MeteredPolicy,
        endpoint: &str,
        now: Timestamp,
    ) -> Result<QuotaDecision, QuotaError> {
        match self.fetch(policy, endpoint).await? {
            Some(record) => self.admit_existing(policy, record, now).await,
            None => self.admit_first(policy, endpoint, now).await,
        }
    }

    async fn fetch(
        &self,
        policy: &MeteredPolicy,
        endpoint: &str,
    ) -> Result<Option<UsageRecord>, QuotaError> {
        bounded(
            self.settings.ledger_timeout,
            self.ledger
                .get_by_key(&policy.identity_key, endpoint, policy.window.boundary()),
        )
        .await
        .map_err(|e| unavailable("fetch usage record", e))
    }

    async fn admit_first(
        &self,
        policy: &MeteredPolicy,
        endpoint: &str,
        now: Timestamp,
    ) -> Result<QuotaDecision, QuotaError> {
        let ledger = self.ledger.clone();
        let record = NewUsageRecord::first_request(policy, endpoint, now);
        let outcome = detached(self.settings.ledger_timeout, "create", async move {
            ledger.create(record).await
        })
        .await
        .map_err(|e| unavailable("create usage record", e))?;

        match outcome {
            CreateOutcome::Created(id) => {
                tracing::info!(
                    identity_key = %policy.identity_key,
                    endpoint,
                    record_id = %id,
                    tier = %policy.tier,
                    usage_count = 1,
                    limit = policy.limit,
                    "first request in window admitted"
                );
                Ok(QuotaDecision::Admit(QuotaSnapshot::Metered(usage(policy, 1, policy.limit))))
            }
            CreateOutcome::CreatedBlocked(id) => {
                tracing::warn!(
                    identity_key = %policy.identity_key,
                    endpoint,
                    record_id = %id,
                    "blocked identity rejected in new window"
                );
                Ok(QuotaDecision::Reject(RejectReason::Blocked))
            }
            CreateOutcome::AlreadyExists => {
                tracing::debug!(identity_key = %policy.identity_key, endpoint, "lost creation race, re-reading");
                match self.fetch(policy, endpoint).await? {
                    Some(record) => self.admit_existing(policy, record, now).await,
                    None => Err(unavailable("re-read usage record", LedgerError::NotFound)),
                }
            }
        }
    }

    async fn admit_existing(
        &self,
        policy: &MeteredPolicy,
        record: UsageRecord,
        now: Timestamp,
    ) -> Result<QuotaDecision, QuotaError> {
        match record.evaluate() {
            RecordState::Blocked => {
                tracing::warn!(identity_key = %record.identity_key, endpoint = %record.endpoint, "blocked identity rejected");
                Ok(QuotaDecision::Reject(RejectReason::Blocked))
            }
            RecordState::Exhausted => {
                tracing::warn!(
                    identity_key = %record.identity_key,
                    endpoint = %record.endpoint,
                    usage_count = record.usage_count,
                    limit = record.limit,
                    "quota exhausted"
                );
                Ok(QuotaDecision::Reject(RejectReason::limit_exceeded(usage(
                    policy,
                    record.usage_count,
                    record.limit,
                ))))
            }
            RecordState::Available => {
                let admitted = record.apply_admit(now);
                match self.increment(&record, now).await {
                    Ok(IncrementOutcome::Incremented(count)) => {
                        tracing::info!(
                            identity_key = %record.identity_key,
                            endpoint = %record.endpoint,
                            usage_count = count,
                            limit = record.limit,
                            "request admitted"
                        );
                        Ok(QuotaDecision::Admit(QuotaSnapshot::Metered(usage(policy, count, record.limit))))
                    }
                    Ok(IncrementOutcome::LimitReached(count)) => {
                        tracing::warn!(
                            identity_key = %record.identity_key,
                            endpoint = %record.endpoint,
                            usage_count = count,
                            limit = record.limit,
                            "concurrent request took the last unit"
                        );
                        Ok(QuotaDecision::Reject(RejectReason::limit_exceeded(usage(
                            policy,
                            count.max(record.limit),
                            record.limit,
                        ))))
                    }
                    Err(err) => {
                        tracing::error!(
                            identity_key = %record.identity_key,
                            endpoint = %record.endpoint,
                            error = %err,
                            "post-admit increment failed, request still admitted"
                        );
                        Ok(QuotaDecision::Admit(QuotaSnapshot::Metered(usage(
                            policy,
                            admitted.usage_count,
                            record.limit,
                        ))))
                    }
                }
            }
        }
    }

    async fn increment(
        &self,
        record: &UsageRecord,
        now: Timestamp,
    ) -> Result<IncrementOutcome, LedgerError> {
        let mut attempt = 0;
        loop {
            let ledger = self.ledger.clone();
            let (id, limit) = (record.id, record.limit);
            let result = detached(self.settings.ledger_timeout, "increment", async move {
                ledger.increment_if_below(id, limit, now).await
            })
            .await;

            match result {
                Err(err) if err.is_retryable_write() && attempt < self.settings.increment_retry_attempts => {
                    attempt += 1;
                    tracing::warn!(record_id = %id, attempt, error = %err, "retrying usage increment");
                    tokio::time::sleep(Duration::from_millis(25 * u64::from(attempt))).await;
                }
                other => return other,
            }
        }
    }
}

fn usage(policy: &MeteredPolicy, used: u32, limit: u32) -> QuotaUsage {
    QuotaUsage {
        tier: policy.tier,
        limit,
        used,
        reset_at: policy.window.reported_reset(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::ManualClock;
    use crate::adapters::ledger::{InMemoryUsageLedger, LedgerOperation};
    use crate::domain::fingerprint::FingerprintHasher;
    use crate::domain::foundation::{Principal, UserId};
    use crate::domain::quota::QuotaLimits;
    use chrono::{DateTime, Utc};
    use std::net::{IpAddr, Ipv4Addr};

    fn at(rfc3339: &str) -> Timestamp {
        Timestamp::from_datetime(
            DateTime::parse_from_rfc3339(rfc3339)
                .unwrap()
                .with_timezone(&Utc),
        )
    }

    fn enforcer(ledger: &InMemoryUsageLedger, clock: &ManualClock) -> RateLimitEnforcer {
        enforcer_with(ledger, clock, EnforcerSettings::default())
    }

    fn enforcer_with(
        ledger: &InMemoryUsageLedger,
        clock: &ManualClock,
        settings: EnforcerSettings,
    ) -> RateLimitEnforcer {
        RateLimitEnforcer::new(
            Arc::new(ledger.clone()),
            PolicyResolver::new(QuotaLimits::default(), FingerprintHasher::new()),
            Arc::new(clock.clone()),
            settings,
        )
    }

    fn request(caller: Caller) -> QuotaRequest {
        QuotaRequest {
            caller,
            signals: ClientSignals::from_peer(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 4)))
                .with_user_agent("Mozilla/5.0 (Windows NT 10.0) Chrome/120.0"),
            endpoint: Endpoint::new("/api/v1/chat").unwrap(),
        }
    }

    fn daily_user() -> Caller {
        Caller::Verified(Principal::locked(UserId::new("u-1").unwrap()))
    }

    fn used(decision: &QuotaDecision) -> u32 {
        match decision {
            QuotaDecision::Admit(QuotaSnapshot::Metered(u)) => u.used,
            other => panic!("expected metered admit, got {:?}", other),
        }
    }

    // ─── Lifetime Window Tests ───────────────────────────────────────

    #[tokio::test]
    async fn anonymous_gets_three_then_trial_limit() {
        let ledger = InMemoryUsageLedger::new();
        let clock = ManualClock::new(at("2024-05-01T10:00:00Z"));
        let enforcer = enforcer(&ledger, &clock);
        let req = request(Caller::Anonymous);

        for expected in 1..=3 {
            let outcome = enforcer.evaluate(&req).await.unwrap();
            assert_eq!(used(&outcome.decision), expected);
        }

        let fourth = enforcer.evaluate(&req).await.unwrap();
        assert_eq!(
            fourth.decision,
            QuotaDecision::Reject(RejectReason::TrialLimitExceeded { used: 3, limit: 3 })
        );
    }

    #[tokio::test]
    async fn lifetime_admit_reports_no_reset() {
        let ledger = InMemoryUsageLedger::new();
        let clock = ManualClock::new(at("2024-05-01T10:00:00Z"));
        let outcome = enforcer(&ledger, &clock)
            .evaluate(&request(Caller::Anonymous))
            .await
            .unwrap();
        match outcome.decision {
            QuotaDecision::Admit(QuotaSnapshot::Metered(usage)) => assert_eq!(usage.reset_at, None),
            other => panic!("unexpected {:?}", other),
        }
    }

    // ─── Daily Window Tests ──────────────────────────────────────────

    #[tokio::test]
    async fn daily_user_rejected_on_fourth_and_fresh_next_day() {
        let ledger = InMemoryUsageLedger::new();
        let clock = ManualClock::new(at("2024-05-01T23:00:00Z"));
        let enforcer = enforcer(&ledger, &clock);
        let req = request(daily_user());

        for _ in 0..3 {
            assert!(enforcer.evaluate(&req).await.unwrap().decision.is_admitted());
        }
        let fourth = enforcer.evaluate(&req).await.unwrap();
        assert_eq!(
            fourth.decision,
            QuotaDecision::Reject(RejectReason::DailyLimitExceeded {
                used: 3,
                limit: 3,
                reset_at: at("2024-05-02T00:00:00Z"),
            })
        );

        clock.set(at("2024-05-02T00:00:01Z"));
        let next_day = enforcer.evaluate(&req).await.unwrap();
        assert_eq!(used(&next_day.decision), 1);
        assert_eq!(ledger.records().await.len(), 2);
    }

    // ─── Unlimited Tier Tests ────────────────────────────────────────

    #[tokio::test]
    async fn unlimited_never_touches_ledger() {
        let ledger = InMemoryUsageLedger::new();
        let clock = ManualClock::new(at("2024-05-01T10:00:00Z"));
        let enforcer = enforcer(&ledger, &clock);
        let req = request(Caller::Verified(Principal::unlocked(UserId::new("vip").unwrap())));

        for _ in 0..10 {
            let outcome = enforcer.evaluate(&req).await.unwrap();
            assert_eq!(outcome.decision, QuotaDecision::Admit(QuotaSnapshot::Unlimited));
        }
        assert_eq!(ledger.call_count(), 0);
    }

    // ─── Blocked Identity Tests ──────────────────────────────────────

    #[tokio::test]
    async fn blocked_identity_rejected_even_at_zero_usage() {
        let ledger = InMemoryUsageLedger::new();
        let clock = ManualClock::new(at("2024-05-01T10:00:00Z"));
        let enforcer = enforcer(&ledger, &clock);
        let req = request(Caller::Anonymous);

        let first = enforcer.evaluate(&req).await.unwrap();
        let key = first.policy.identity_key().to_string();
        ledger.reset_usage(&key, "/api/v1/chat", clock.now()).await.unwrap();
        ledger.mark_blocked(&key, "manual", clock.now()).await.unwrap();

        let outcome = enforcer.evaluate(&req).await.unwrap();
        assert_eq!(outcome.decision, QuotaDecision::Reject(RejectReason::Blocked));
    }

    #[tokio::test]
    async fn blocked_daily_user_stays_blocked_after_midnight() {
        let ledger = InMemoryUsageLedger::new();
        let clock = ManualClock::new(at("2024-05-01T10:00:00Z"));
        let enforcer = enforcer(&ledger, &clock);
        let req = request(daily_user());

        let first = enforcer.evaluate(&req).await.unwrap();
        let key = first.policy.identity_key().to_string();
        ledger.mark_blocked(&key, "manual", clock.now()).await.unwrap();
        assert_eq!(
            enforcer.evaluate(&req).await.unwrap().decision,
            QuotaDecision::Reject(RejectReason::Blocked)
        );

        clock.set(at("2024-05-02T00:00:01Z"));
        assert_eq!(
            enforcer.evaluate(&req).await.unwrap().decision,
            QuotaDecision::Reject(RejectReason::Blocked)
        );

        ledger.clear_block(&key, clock.now()).await.unwrap();
        assert!(enforcer.evaluate(&req).await.unwrap().decision.is_admitted());
    }

    #[tokio::test]
    async fn block_recorded_before_first_request_rejects_it() {
        let ledger = InMemoryUsageLedger::new();
        let clock = ManualClock::new(at("2024-05-01T10:00:00Z"));
        ledger.mark_blocked("user_u-1", "manual", clock.now()).await.unwrap();

        let outcome = enforcer(&ledger, &clock)
            .evaluate(&request(daily_user()))
            .await
            .unwrap();
        assert_eq!(outcome.policy.identity_key(), "user_u-1");
        assert_eq!(outcome.decision, QuotaDecision::Reject(RejectReason::Blocked));
    }

    // ─── Failure Semantics Tests ─────────────────────────────────────

    #[tokio::test]
    async fn read_failure_fails_request() {
        let ledger = InMemoryUsageLedger::new();
        ledger.fail_on(LedgerOperation::GetByKey, LedgerError::unavailable("down")).await;
        let clock = ManualClock::new(at("2024-05-01T10:00:00Z"));

        let result = enforcer(&ledger, &clock).evaluate(&request(Caller::Anonymous)).await;
        assert!(matches!(result, Err(QuotaError::LedgerUnavailable(_))));
    }

    #[tokio::test]
    async fn create_failure_fails_request() {
        let ledger = InMemoryUsageLedger::new();
        ledger.fail_on(LedgerOperation::Create, LedgerError::unavailable("down")).await;
        let clock = ManualClock::new(at("2024-05-01T10:00:00Z"));

        let result = enforcer(&ledger, &clock).evaluate(&request(Caller::Anonymous)).await;
        assert!(matches!(result, Err(QuotaError::LedgerUnavailable(_))));
    }

    #[tokio::test]
    async fn slow_ledger_times_out_as_unavailable() {
        let ledger = InMemoryUsageLedger::new().with_latency(Duration::from_millis(200));
        let clock = ManualClock::new(at("2024-05-01T10:00:00Z"));
        let settings = EnforcerSettings {
            ledger_timeout: Duration::from_millis(20),
            increment_retry_attempts: 0,
        };

        let result = enforcer_with(&ledger, &clock, settings)
            .evaluate(&request(Caller::Anonymous))
            .await;
        assert!(matches!(result, Err(QuotaError::LedgerUnavailable(_))));
    }

    #[tokio::test]
    async fn increment_failure_is_logged_and_admitted() {
        let ledger = InMemoryUsageLedger::new();
        let clock = ManualClock::new(at("2024-05-01T10:00:00Z"));
        let enforcer = enforcer(&ledger, &clock);
        let req = request(Caller::Anonymous);
        enforcer.evaluate(&req).await.unwrap();

        ledger.fail_on(LedgerOperation::Increment, LedgerError::unavailable("down")).await;
        let outcome = enforcer.evaluate(&req).await.unwrap();
        assert_eq!(used(&outcome.decision), 2);

        // the lost increment leaves the stored count untouched
        let stored = ledger.records().await;
        assert_eq!(stored[0].usage_count, 1);
    }

    #[tokio::test]
    async fn timed_out_increment_is_not_resent() {
        let ledger = InMemoryUsageLedger::new()
            .with_latency_on(LedgerOperation::Increment, Duration::from_millis(60));
        let clock = ManualClock::new(at("2024-05-01T10:00:00Z"));
        let settings = EnforcerSettings {
            ledger_timeout: Duration::from_millis(40),
            increment_retry_attempts: 2,
        };
        let enforcer = enforcer_with(&ledger, &clock, settings);
        let req = request(Caller::Anonymous);

        enforcer.evaluate(&req).await.unwrap();
        let second = enforcer.evaluate(&req).await.unwrap();
        assert_eq!(used(&second.decision), 2);

        // let the abandoned write land
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(ledger.records().await[0].usage_count, 2);
    }

    #[tokio::test]
    async fn refused_increment_is_retried() {
        let ledger = InMemoryUsageLedger::new();
        let clock = ManualClock::new(at("2024-05-01T10:00:00Z"));
        let settings = EnforcerSettings {
            increment_retry_attempts: 2,
            ..EnforcerSettings::default()
        };
        let enforcer = enforcer_with(&ledger, &clock, settings);
        let req = request(Caller::Anonymous);
        enforcer.evaluate(&req).await.unwrap();

        ledger.fail_on(LedgerOperation::Increment, LedgerError::unavailable("down")).await;
        let before = ledger.call_count();
        let outcome = enforcer.evaluate(&req).await.unwrap();
        assert!(outcome.decision.is_admitted());
        // one read plus three increment attempts
        assert_eq!(ledger.call_count() - before, 4);
    }

    // ─── Concurrency Tests ───────────────────────────────────────────

    #[tokio::test]
    async fn concurrent_requests_at_last_unit_admit_at_most_one() {
        let ledger = InMemoryUsageLedger::new();
        let clock = ManualClock::new(at("2024-05-01T10:00:00Z"));
        let enforcer = Arc::new(enforcer(&ledger, &clock));
        let req = request(daily_user());
        enforcer.evaluate(&req).await.unwrap();
        enforcer.evaluate(&req).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let enforcer = enforcer.clone();
                let req = req.clone();
                tokio::spawn(async move { enforcer.evaluate(&req).await })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().decision.is_admitted() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(ledger.records().await[0].usage_count, 3);
    }

    #[tokio::test]
    async fn concurrent_first_requests_create_one_row() {
        let ledger = InMemoryUsageLedger::new();
        let clock = ManualClock::new(at("2024-05-01T10:00:00Z"));
        let enforcer = Arc::new(enforcer(&ledger, &clock));
        let req = request(Caller::Anonymous);

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let enforcer = enforcer.clone();
                let req = req.clone();
                tokio::spawn(async move { enforcer.evaluate(&req).await })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().decision.is_admitted() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 3);
        assert_eq!(ledger.records().await.len(), 1);
    }
}
