//! Usage ledger rows and the pure admission rules applied to them.

use crate::domain::foundation::{Timestamp, UsageRecordId};

use super::policy::{is_user_identity_key, MeteredPolicy};

/// One row per identity, endpoint and window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub id: UsageRecordId,
    pub identity_key: String,
    pub endpoint: String,
    pub ip_address: String,
    pub user_agent_hash: String,
    pub usage_count: u32,
    pub limit: u32,
    pub window_reset_at: Timestamp,
    pub last_request_at: Timestamp,
    pub is_blocked: bool,
    pub blocked_reason: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Admission state of an existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Blocked,
    Exhausted,
    Available,
}

impl UsageRecord {
    /// Classifies the row. Blocking wins over any count.
    pub fn evaluate(&self) -> RecordState {
        if self.is_blocked {
            RecordState::Blocked
        } else if self.usage_count >= self.limit {
            RecordState::Exhausted
        } else {
            RecordState::Available
        }
    }

    /// Units left in the window, floored at zero.
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.usage_count)
    }

    /// Returns the row as it looks after admitting one more request.
    pub fn apply_admit(&self, now: Timestamp) -> UsageRecord {
        UsageRecord {
            usage_count: self.usage_count.saturating_add(1),
            last_request_at: now,
            updated_at: now,
            ..self.clone()
        }
    }

    /// Returns the row with its block flag set.
    pub fn apply_block(&self, reason: &str, now: Timestamp) -> UsageRecord {
        UsageRecord {
            is_blocked: true,
            blocked_reason: Some(reason.to_string()),
            updated_at: now,
            ..self.clone()
        }
    }

    /// True for rows created for unauthenticated callers.
    pub fn is_anonymous(&self) -> bool {
        !is_user_identity_key(&self.identity_key)
    }
}

/// Row to insert on a caller's first request in a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUsageRecord {
    pub identity_key: String,
    pub endpoint: String,
    pub ip_address: String,
    pub user_agent_hash: String,
    pub limit: u32,
    pub window_reset_at: Timestamp,
    pub requested_at: Timestamp,
}

impl NewUsageRecord {
    /// Builds the first row for `policy`; creation itself consumes one unit.
    pub fn first_request(policy: &MeteredPolicy, endpoint: &str, now: Timestamp) -> Self {
        Self {
            identity_key: policy.identity_key.clone(),
            endpoint: endpoint.to_string(),
            ip_address: policy.client_ip.clone(),
            user_agent_hash: policy.user_agent_hash.clone(),
            limit: policy.limit,
            window_reset_at: policy.window.boundary(),
            requested_at: now,
        }
    }

    /// Materializes the row with `usage_count = 1`.
    pub fn into_record(self, id: UsageRecordId) -> UsageRecord {
        UsageRecord {
            id,
            identity_key: self.identity_key,
            endpoint: self.endpoint,
            ip_address: self.ip_address,
            user_agent_hash: self.user_agent_hash,
            usage_count: 1,
            limit: self.limit,
            window_reset_at: self.window_reset_at,
            last_request_at: self.requested_at,
            is_blocked: false,
            blocked_reason: None,
            created_at: self.requested_at,
            updated_at: self.requested_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(count: u32, limit: u32) -> UsageRecord {
        let now = Timestamp::now();
        UsageRecord {
            id: UsageRecordId::new(),
            identity_key: "abc".to_string(),
            endpoint: "/api".to_string(),
            ip_address: "1.2.3.4".to_string(),
            user_agent_hash: "ua".to_string(),
            usage_count: count,
            limit,
            window_reset_at: Timestamp::lifetime_sentinel(),
            last_request_at: now,
            is_blocked: false,
            blocked_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn below_limit_is_available() {
        assert_eq!(record(2, 3).evaluate(), RecordState::Available);
    }

    #[test]
    fn at_or_above_limit_is_exhausted() {
        assert_eq!(record(3, 3).evaluate(), RecordState::Exhausted);
        assert_eq!(record(7, 3).evaluate(), RecordState::Exhausted);
    }

    #[test]
    fn blocked_wins_even_at_zero_usage() {
        let blocked = record(0, 3).apply_block("x", Timestamp::now());
        assert_eq!(blocked.evaluate(), RecordState::Blocked);
        assert_eq!(blocked.blocked_reason.as_deref(), Some("x"));
    }

    #[test]
    fn remaining_floors_at_zero() {
        assert_eq!(record(1, 3).remaining(), 2);
        assert_eq!(record(5, 3).remaining(), 0);
    }

    #[test]
    fn apply_admit_returns_new_snapshot_and_leaves_original() {
        let original = record(1, 3);
        let later = Timestamp::now().plus_secs(5);
        let admitted = original.apply_admit(later);
        assert_eq!(original.usage_count, 1);
        assert_eq!(admitted.usage_count, 2);
        assert_eq!(admitted.last_request_at, later);
        assert_eq!(admitted.window_reset_at, original.window_reset_at);
    }

    #[test]
    fn new_record_starts_at_one() {
        let now = Timestamp::now();
        let new = NewUsageRecord {
            identity_key: "k".to_string(),
            endpoint: "/e".to_string(),
            ip_address: "ip".to_string(),
            user_agent_hash: "h".to_string(),
            limit: 3,
            window_reset_at: now.next_utc_midnight(),
            requested_at: now,
        };
        let rec = new.into_record(UsageRecordId::new());
        assert_eq!(rec.usage_count, 1);
        assert_eq!(rec.last_request_at, now);
        assert!(!rec.is_blocked);
    }

    #[test]
    fn user_rows_are_not_anonymous() {
        let mut rec = record(0, 3);
        assert!(rec.is_anonymous());
        rec.identity_key = "user_1".to_string();
        assert!(!rec.is_anonymous());
    }
}
