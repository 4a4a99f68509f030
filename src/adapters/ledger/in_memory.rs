//! In-memory usage ledger for testing and single-process development.
//!
//! All rows live behind one `tokio::sync::RwLock`, so every operation is
//! serialized and the conditional increment is trivially atomic. Not suitable
//! for multi-instance deployments since counts are lost on restart.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::domain::foundation::{Timestamp, UsageRecordId};
use crate::domain::quota::{NewUsageRecord, UsageRecord};
use crate::ports::{CreateOutcome, IncrementOutcome, LedgerError, UsageLedger};

/// Ledger operations that can be made to fail in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerOperation {
    GetByKey,
    Create,
    Increment,
    ListByIp,
    MarkBlocked,
    IsBlocked,
    ClearBlock,
    ResetUsage,
    Purge,
}

type WindowKey = (String, String, Timestamp);

#[derive(Debug, Default)]
struct LedgerState {
    records: HashMap<UsageRecordId, UsageRecord>,
    by_window: HashMap<WindowKey, UsageRecordId>,
    /// Standing blocks by identity key, with their reason.
    blocks: HashMap<String, String>,
}

/// In-memory implementation of [`UsageLedger`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryUsageLedger {
    state: Arc<RwLock<LedgerState>>,
    failures: Arc<RwLock<HashMap<LedgerOperation, LedgerError>>>,
    latency: Option<Duration>,
    slow: Option<(LedgerOperation, Duration)>,
    calls: Arc<AtomicUsize>,
}

impl InMemoryUsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds artificial latency to every operation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Adds artificial latency to a single operation.
    pub fn with_latency_on(mut self, operation: LedgerOperation, latency: Duration) -> Self {
        self.slow = Some((operation, latency));
        self
    }

    /// Makes `operation` fail with `error` until cleared.
    pub async fn fail_on(&self, operation: LedgerOperation, error: LedgerError) {
        self.failures.write().await.insert(operation, error);
    }

    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    /// Number of port calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Snapshot of every stored row.
    pub async fn records(&self) -> Vec<UsageRecord> {
        self.state.read().await.records.values().cloned().collect()
    }

    /// Inserts a fully formed row, bypassing the create path.
    pub async fn insert(&self, record: UsageRecord) {
        let mut state = self.state.write().await;
        let key = window_key(&record.identity_key, &record.endpoint, record.window_reset_at);
        state.by_window.insert(key, record.id);
        state.records.insert(record.id, record);
    }

    async fn enter(&self, operation: LedgerOperation) -> Result<(), LedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some((slow_operation, latency)) = self.slow {
            if slow_operation == operation {
                tokio::time::sleep(latency).await;
            }
        }
        match self.failures.read().await.get(&operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

fn window_key(identity_key: &str, endpoint: &str, window_reset_at: Timestamp) -> WindowKey {
    (identity_key.to_string(), endpoint.to_string(), window_reset_at)
}

#[async_trait]
impl UsageLedger for InMemoryUsageLedger {
    async fn get_by_key(
        &self,
        identity_key: &str,
        endpoint: &str,
        window_reset_at: Timestamp,
    ) -> Result<Option<UsageRecord>, LedgerError> {
        self.enter(LedgerOperation::GetByKey).await?;
        let state = self.state.read().await;
        Ok(state
            .by_window
            .get(&window_key(identity_key, endpoint, window_reset_at))
            .and_then(|id| state.records.get(id))
            .cloned())
    }

    async fn create(&self, record: NewUsageRecord) -> Result<CreateOutcome, LedgerError> {
        self.enter(LedgerOperation::Create).await?;
        let mut state = self.state.write().await;
        let key = window_key(&record.identity_key, &record.endpoint, record.window_reset_at);
        if state.by_window.contains_key(&key) {
            return Ok(CreateOutcome::AlreadyExists);
        }

        let id = UsageRecordId::new();
        let requested_at = record.requested_at;
        let (row, outcome) = match state.blocks.get(&record.identity_key) {
            Some(reason) => (
                record.into_record(id).apply_block(reason, requested_at),
                CreateOutcome::CreatedBlocked(id),
            ),
            None => (record.into_record(id), CreateOutcome::Created(id)),
        };
        state.by_window.insert(key, id);
        state.records.insert(id, row);
        Ok(outcome)
    }

    async fn increment_if_below(
        &self,
        id: UsageRecordId,
        limit: u32,
        now: Timestamp,
    ) -> Result<IncrementOutcome, LedgerError> {
        self.enter(LedgerOperation::Increment).await?;
        let mut state = self.state.write().await;
        let record = state.records.get_mut(&id).ok_or(LedgerError::NotFound)?;

        if record.usage_count >= limit {
            return Ok(IncrementOutcome::LimitReached(record.usage_count));
        }

        *record = record.apply_admit(now);
        Ok(IncrementOutcome::Incremented(record.usage_count))
    }

    async fn list_by_ip(&self, ip: &str, since: Timestamp) -> Result<Vec<UsageRecord>, LedgerError> {
        self.enter(LedgerOperation::ListByIp).await?;
        let state = self.state.read().await;
        let mut rows: Vec<UsageRecord> = state
            .records
            .values()
            .filter(|r| r.ip_address == ip && !r.created_at.is_before(&since))
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.created_at);
        Ok(rows)
    }

    async fn mark_blocked(
        &self,
        identity_key: &str,
        reason: &str,
        now: Timestamp,
    ) -> Result<u64, LedgerError> {
        self.enter(LedgerOperation::MarkBlocked).await?;
        let mut state = self.state.write().await;
        state.blocks.insert(identity_key.to_string(), reason.to_string());
        let mut touched = 0;
        for record in state.records.values_mut().filter(|r| r.identity_key == identity_key) {
            *record = record.apply_block(reason, now);
            touched += 1;
        }
        Ok(touched)
    }

    async fn is_blocked(&self, identity_key: &str) -> Result<bool, LedgerError> {
        self.enter(LedgerOperation::IsBlocked).await?;
        Ok(self.state.read().await.blocks.contains_key(identity_key))
    }

    async fn clear_block(&self, identity_key: &str, now: Timestamp) -> Result<u64, LedgerError> {
        self.enter(LedgerOperation::ClearBlock).await?;
        let mut state = self.state.write().await;
        state.blocks.remove(identity_key);
        let mut touched = 0;
        for record in state.records.values_mut().filter(|r| r.identity_key == identity_key) {
            record.is_blocked = false;
            record.blocked_reason = None;
            record.updated_at = now;
            touched += 1;
        }
        Ok(touched)
    }

    async fn reset_usage(
        &self,
        identity_key: &str,
        endpoint: &str,
        now: Timestamp,
    ) -> Result<u64, LedgerError> {
        self.enter(LedgerOperation::ResetUsage).await?;
        let mut state = self.state.write().await;
        let mut touched = 0;
        for record in state.records.values_mut().filter(|r| {
            r.identity_key == identity_key && r.endpoint == endpoint && r.window_reset_at.is_after(&now)
        }) {
            record.usage_count = 0;
            record.updated_at = now;
            touched += 1;
        }
        Ok(touched)
    }

    async fn purge_older_than(&self, cutoff: Timestamp) -> Result<u64, LedgerError> {
        self.enter(LedgerOperation::Purge).await?;
        let mut state = self.state.write().await;
        let expired: Vec<UsageRecordId> = state
            .records
            .values()
            .filter(|r| r.created_at.is_before(&cutoff) && !r.is_blocked)
            .map(|r| r.id)
            .collect();

        for id in &expired {
            if let Some(record) = state.records.remove(id) {
                state.by_window.remove(&window_key(
                    &record.identity_key,
                    &record.endpoint,
                    record.window_reset_at,
                ));
            }
        }
        Ok(expired.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_record(key: &str, ip: &str, now: Timestamp) -> NewUsageRecord {
        NewUsageRecord {
            identity_key: key.to_string(),
            endpoint: "/api/chat".to_string(),
            ip_address: ip.to_string(),
            user_agent_hash: "ua".to_string(),
            limit: 3,
            window_reset_at: Timestamp::lifetime_sentinel(),
            requested_at: now,
        }
    }

    async fn created_id(ledger: &InMemoryUsageLedger, record: NewUsageRecord) -> UsageRecordId {
        match ledger.create(record).await.unwrap() {
            CreateOutcome::Created(id) => id,
            other => panic!("expected Created, got {:?}", other),
        }
    }

    // ─── Create / Get Tests ──────────────────────────────────────────

    #[tokio::test]
    async fn create_then_get_returns_row_with_count_one() {
        let ledger = InMemoryUsageLedger::new();
        let now = Timestamp::now();
        created_id(&ledger, new_record("k", "1.1.1.1", now)).await;

        let row = ledger
            .get_by_key("k", "/api/chat", Timestamp::lifetime_sentinel())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.usage_count, 1);
        assert_eq!(row.limit, 3);
    }

    #[tokio::test]
    async fn duplicate_create_reports_already_exists() {
        let ledger = InMemoryUsageLedger::new();
        let now = Timestamp::now();
        created_id(&ledger, new_record("k", "1.1.1.1", now)).await;
        let second = ledger.create(new_record("k", "1.1.1.1", now)).await.unwrap();
        assert_eq!(second, CreateOutcome::AlreadyExists);
        assert_eq!(ledger.records().await.len(), 1);
    }

    #[tokio::test]
    async fn get_with_other_window_returns_none() {
        let ledger = InMemoryUsageLedger::new();
        let now = Timestamp::now();
        created_id(&ledger, new_record("k", "1.1.1.1", now)).await;
        let row = ledger
            .get_by_key("k", "/api/chat", now.next_utc_midnight())
            .await
            .unwrap();
        assert!(row.is_none());
    }

    // ─── Increment Tests ─────────────────────────────────────────────

    #[tokio::test]
    async fn increment_stops_at_limit() {
        let ledger = InMemoryUsageLedger::new();
        let now = Timestamp::now();
        let id = created_id(&ledger, new_record("k", "1.1.1.1", now)).await;

        assert_eq!(ledger.increment_if_below(id, 3, now).await.unwrap(), IncrementOutcome::Incremented(2));
        assert_eq!(ledger.increment_if_below(id, 3, now).await.unwrap(), IncrementOutcome::Incremented(3));
        assert_eq!(ledger.increment_if_below(id, 3, now).await.unwrap(), IncrementOutcome::LimitReached(3));
    }

    #[tokio::test]
    async fn increment_unknown_id_is_not_found() {
        let ledger = InMemoryUsageLedger::new();
        let result = ledger.increment_if_below(UsageRecordId::new(), 3, Timestamp::now()).await;
        assert_eq!(result, Err(LedgerError::NotFound));
    }

    #[tokio::test]
    async fn concurrent_increments_never_exceed_limit() {
        let ledger = InMemoryUsageLedger::new();
        let now = Timestamp::now();
        let id = created_id(&ledger, new_record("k", "1.1.1.1", now)).await;

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.increment_if_below(id, 3, now).await })
            })
            .collect();

        let mut incremented = 0;
        for handle in handles {
            if let Ok(IncrementOutcome::Incremented(_)) = handle.await.unwrap() {
                incremented += 1;
            }
        }
        assert_eq!(incremented, 2);
    }

    // ─── Block / Unblock Tests ───────────────────────────────────────

    #[tokio::test]
    async fn mark_blocked_and_clear_block_touch_all_rows_for_key() {
        let ledger = InMemoryUsageLedger::new();
        let now = Timestamp::now();
        created_id(&ledger, new_record("k", "1.1.1.1", now)).await;
        let mut other_endpoint = new_record("k", "1.1.1.1", now);
        other_endpoint.endpoint = "/api/other".to_string();
        created_id(&ledger, other_endpoint).await;

        assert_eq!(ledger.mark_blocked("k", "abuse", now).await.unwrap(), 2);
        assert!(ledger.records().await.iter().all(|r| r.is_blocked && r.updated_at == now));

        let later = now.plus_secs(60);
        assert_eq!(ledger.clear_block("k", later).await.unwrap(), 2);
        assert!(ledger
            .records()
            .await
            .iter()
            .all(|r| !r.is_blocked && r.blocked_reason.is_none() && r.updated_at == later));
    }

    #[tokio::test]
    async fn rows_created_after_a_block_start_blocked() {
        let ledger = InMemoryUsageLedger::new();
        let now = Timestamp::now();
        assert_eq!(ledger.mark_blocked("k", "abuse", now).await.unwrap(), 0);
        assert!(ledger.is_blocked("k").await.unwrap());

        let outcome = ledger.create(new_record("k", "1.1.1.1", now)).await.unwrap();
        assert!(matches!(outcome, CreateOutcome::CreatedBlocked(_)));
        let row = ledger
            .get_by_key("k", "/api/chat", Timestamp::lifetime_sentinel())
            .await
            .unwrap()
            .unwrap();
        assert!(row.is_blocked);
        assert_eq!(row.blocked_reason.as_deref(), Some("abuse"));

        ledger.clear_block("k", now).await.unwrap();
        assert!(!ledger.is_blocked("k").await.unwrap());
        let mut other = new_record("k", "1.1.1.1", now);
        other.endpoint = "/api/other".to_string();
        assert!(matches!(ledger.create(other).await.unwrap(), CreateOutcome::Created(_)));
    }

    // ─── List / Purge Tests ──────────────────────────────────────────

    #[tokio::test]
    async fn list_by_ip_filters_ip_and_age() {
        let ledger = InMemoryUsageLedger::new();
        let now = Timestamp::now();
        created_id(&ledger, new_record("old", "9.9.9.9", now.minus_hours(30))).await;
        created_id(&ledger, new_record("new", "9.9.9.9", now.minus_hours(1))).await;
        created_id(&ledger, new_record("elsewhere", "8.8.8.8", now)).await;

        let rows = ledger.list_by_ip("9.9.9.9", now.minus_hours(24)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].identity_key, "new");
    }

    #[tokio::test]
    async fn purge_skips_blocked_rows() {
        let ledger = InMemoryUsageLedger::new();
        let now = Timestamp::now();
        created_id(&ledger, new_record("stale", "1.1.1.1", now.minus_days(40))).await;
        created_id(&ledger, new_record("blocked", "1.1.1.1", now.minus_days(40))).await;
        created_id(&ledger, new_record("fresh", "1.1.1.1", now)).await;
        ledger.mark_blocked("blocked", "abuse", now).await.unwrap();

        let purged = ledger.purge_older_than(now.minus_days(30)).await.unwrap();
        assert_eq!(purged, 1);
        let keys: Vec<String> = ledger.records().await.into_iter().map(|r| r.identity_key).collect();
        assert!(keys.contains(&"blocked".to_string()));
        assert!(keys.contains(&"fresh".to_string()));
        assert!(!keys.contains(&"stale".to_string()));
    }

    #[tokio::test]
    async fn reset_usage_zeroes_live_window_only() {
        let ledger = InMemoryUsageLedger::new();
        let now = Timestamp::now();
        let id = created_id(&ledger, new_record("k", "1.1.1.1", now)).await;
        ledger.increment_if_below(id, 3, now).await.unwrap();

        assert_eq!(ledger.reset_usage("k", "/api/chat", now).await.unwrap(), 1);
        let row = ledger.get_by_key("k", "/api/chat", Timestamp::lifetime_sentinel()).await.unwrap().unwrap();
        assert_eq!(row.usage_count, 0);
        assert_eq!(ledger.reset_usage("k", "/api/other", now).await.unwrap(), 0);
    }

    // ─── Failure Injection Tests ─────────────────────────────────────

    #[tokio::test]
    async fn injected_failure_is_returned_and_counted() {
        let ledger = InMemoryUsageLedger::new();
        ledger.fail_on(LedgerOperation::GetByKey, LedgerError::Timeout).await;

        let result = ledger.get_by_key("k", "/e", Timestamp::now()).await;
        assert_eq!(result, Err(LedgerError::Timeout));
        assert_eq!(ledger.call_count(), 1);

        ledger.clear_failures().await;
        assert!(ledger.get_by_key("k", "/e", Timestamp::now()).await.is_ok());
    }
}
