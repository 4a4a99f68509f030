//! PostgreSQL implementation of UsageLedger.
//!
//! Shared across instances, so limits hold under horizontal scaling and
//! survive restarts. The unique index on
//! `(identity_key, endpoint, window_reset_at)` backs `create`, and the
//! conditional `UPDATE ... WHERE usage_count < $limit RETURNING` backs
//! `increment_if_below` as a single atomic statement. Standing blocks live in
//! `quota_identity_blocks`, and `create` copies them onto new rows.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::foundation::{Timestamp, UsageRecordId};
use crate::domain::quota::{NewUsageRecord, UsageRecord};
use crate::ports::{CreateOutcome, IncrementOutcome, LedgerError, UsageLedger};

const SELECT_COLUMNS: &str = r#"
    id, identity_key, endpoint, ip_address, user_agent_hash, usage_count,
    usage_limit, window_reset_at, last_request_at, is_blocked, blocked_reason,
    created_at, updated_at
"#;

/// PostgreSQL implementation of UsageLedger.
#[derive(Clone)]
pub struct PostgresUsageLedger {
    pool: PgPool,
}

impl PostgresUsageLedger {
    /// Creates a new PostgresUsageLedger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl std::fmt::Debug for PostgresUsageLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresUsageLedger").finish_non_exhaustive()
    }
}

#[async_trait]
impl UsageLedger for PostgresUsageLedger {
    async fn get_by_key(
        &self,
        identity_key: &str,
        endpoint: &str,
        window_reset_at: Timestamp,
    ) -> Result<Option<UsageRecord>, LedgerError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM quota_usage_ledger
            WHERE identity_key = $1 AND endpoint = $2 AND window_reset_at = $3
            "#,
            SELECT_COLUMNS
        ))
        .bind(identity_key)
        .bind(endpoint)
        .bind(window_reset_at.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("fetch usage record", e))?;

        row.map(row_to_record).transpose()
    }

    async fn create(&self, record: NewUsageRecord) -> Result<CreateOutcome, LedgerError> {
        let id = UsageRecordId::new();
        let inserted = sqlx::query(
            r#"
            INSERT INTO quota_usage_ledger (
                id, identity_key, endpoint, ip_address, user_agent_hash,
                usage_count, usage_limit, window_reset_at, last_request_at,
                is_blocked, blocked_reason, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, 1, $6, $7, $8,
                EXISTS (SELECT 1 FROM quota_identity_blocks WHERE identity_key = $2),
                (SELECT reason FROM quota_identity_blocks WHERE identity_key = $2),
                $8, $8
            )
            ON CONFLICT (identity_key, endpoint, window_reset_at) DO NOTHING
            RETURNING is_blocked
            "#,
        )
        .bind(id.as_uuid())
        .bind(&record.identity_key)
        .bind(&record.endpoint)
        .bind(&record.ip_address)
        .bind(&record.user_agent_hash)
        .bind(to_db_count(record.limit))
        .bind(record.window_reset_at.as_datetime())
        .bind(record.requested_at.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("insert usage record", e))?;

        let Some(row) = inserted else {
            return Ok(CreateOutcome::AlreadyExists);
        };
        let blocked: bool = row
            .try_get("is_blocked")
            .map_err(|e| LedgerError::Corrupt(e.to_string()))?;

        Ok(if blocked {
            CreateOutcome::CreatedBlocked(id)
        } else {
            CreateOutcome::Created(id)
        })
    }

    async fn increment_if_below(
        &self,
        id: UsageRecordId,
        limit: u32,
        now: Timestamp,
    ) -> Result<IncrementOutcome, LedgerError> {
        let updated = sqlx::query(
            r#"
            UPDATE quota_usage_ledger SET
                usage_count = usage_count + 1,
                last_request_at = $3,
                updated_at = $3
            WHERE id = $1 AND usage_count < $2
            RETURNING usage_count
            "#,
        )
        .bind(id.as_uuid())
        .bind(to_db_count(limit))
        .bind(now.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("increment usage record", e))?;

        if let Some(row) = updated {
            let count: i32 = row
                .try_get("usage_count")
                .map_err(|e| LedgerError::Corrupt(e.to_string()))?;
            return Ok(IncrementOutcome::Incremented(from_db_count(count)?));
        }

        // Either the row is at its limit or it does not exist.
        let current: Option<(i32,)> =
            sqlx::query_as("SELECT usage_count FROM quota_usage_ledger WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("read usage count", e))?;

        match current {
            Some((count,)) => Ok(IncrementOutcome::LimitReached(from_db_count(count)?)),
            None => Err(LedgerError::NotFound),
        }
    }

    async fn list_by_ip(&self, ip: &str, since: Timestamp) -> Result<Vec<UsageRecord>, LedgerError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM quota_usage_ledger
            WHERE ip_address = $1 AND created_at >= $2
            ORDER BY created_at ASC
            "#,
            SELECT_COLUMNS
        ))
        .bind(ip)
        .bind(since.as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list usage records by ip", e))?;

        rows.into_iter().map(row_to_record).collect()
    }

    async fn mark_blocked(
        &self,
        identity_key: &str,
        reason: &str,
        now: Timestamp,
    ) -> Result<u64, LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("start transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO quota_identity_blocks (identity_key, reason, blocked_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (identity_key) DO UPDATE SET
                reason = EXCLUDED.reason,
                blocked_at = EXCLUDED.blocked_at
            "#,
        )
        .bind(identity_key)
        .bind(reason)
        .bind(now.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("record identity block", e))?;

        let result = sqlx::query(
            r#"
            UPDATE quota_usage_ledger SET
                is_blocked = TRUE,
                blocked_reason = $2,
                updated_at = $3
            WHERE identity_key = $1
            "#,
        )
        .bind(identity_key)
        .bind(reason)
        .bind(now.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("block identity", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("commit transaction", e))?;

        Ok(result.rows_affected())
    }

    async fn is_blocked(&self, identity_key: &str) -> Result<bool, LedgerError> {
        let (blocked,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM quota_identity_blocks WHERE identity_key = $1)",
        )
        .bind(identity_key)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("read identity block", e))?;

        Ok(blocked)
    }

    async fn clear_block(&self, identity_key: &str, now: Timestamp) -> Result<u64, LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("start transaction", e))?;

        sqlx::query("DELETE FROM quota_identity_blocks WHERE identity_key = $1")
            .bind(identity_key)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("delete identity block", e))?;

        let result = sqlx::query(
            r#"
            UPDATE quota_usage_ledger SET
                is_blocked = FALSE,
                blocked_reason = NULL,
                updated_at = $2
            WHERE identity_key = $1
            "#,
        )
        .bind(identity_key)
        .bind(now.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("unblock identity", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("commit transaction", e))?;

        Ok(result.rows_affected())
    }

    async fn reset_usage(
        &self,
        identity_key: &str,
        endpoint: &str,
        now: Timestamp,
    ) -> Result<u64, LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE quota_usage_ledger SET
                usage_count = 0,
                updated_at = $3
            WHERE identity_key = $1 AND endpoint = $2 AND window_reset_at > $3
            "#,
        )
        .bind(identity_key)
        .bind(endpoint)
        .bind(now.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("reset usage", e))?;

        Ok(result.rows_affected())
    }

    async fn purge_older_than(&self, cutoff: Timestamp) -> Result<u64, LedgerError> {
        let result = sqlx::query(
            "DELETE FROM quota_usage_ledger WHERE created_at < $1 AND is_blocked = FALSE",
        )
        .bind(cutoff.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("purge usage records", e))?;

        Ok(result.rows_affected())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Helper functions
// ════════════════════════════════════════════════════════════════════════════════

fn db_error(action: &str, e: sqlx::Error) -> LedgerError {
    match e {
        sqlx::Error::PoolTimedOut => LedgerError::Timeout,
        other => LedgerError::Unavailable(format!("Failed to {}: {}", action, other)),
    }
}

fn to_db_count(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn from_db_count(value: i32) -> Result<u32, LedgerError> {
    u32::try_from(value).map_err(|_| LedgerError::Corrupt(format!("negative count: {}", value)))
}

fn row_to_record(row: PgRow) -> Result<UsageRecord, LedgerError> {
    let corrupt = |e: sqlx::Error| LedgerError::Corrupt(e.to_string());

    let id: Uuid = row.try_get("id").map_err(corrupt)?;
    let usage_count: i32 = row.try_get("usage_count").map_err(corrupt)?;
    let limit: i32 = row.try_get("usage_limit").map_err(corrupt)?;
    let window_reset_at: chrono::DateTime<chrono::Utc> =
        row.try_get("window_reset_at").map_err(corrupt)?;
    let last_request_at: chrono::DateTime<chrono::Utc> =
        row.try_get("last_request_at").map_err(corrupt)?;
    let created_at: chrono::DateTime<chrono::Utc> = row.try_get("created_at").map_err(corrupt)?;
    let updated_at: chrono::DateTime<chrono::Utc> = row.try_get("updated_at").map_err(corrupt)?;

    Ok(UsageRecord {
        id: UsageRecordId::from_uuid(id),
        identity_key: row.try_get("identity_key").map_err(corrupt)?,
        endpoint: row.try_get("endpoint").map_err(corrupt)?,
        ip_address: row.try_get("ip_address").map_err(corrupt)?,
        user_agent_hash: row.try_get("user_agent_hash").map_err(corrupt)?,
        usage_count: from_db_count(usage_count)?,
        limit: from_db_count(limit)?,
        window_reset_at: Timestamp::from_datetime(window_reset_at),
        last_request_at: Timestamp::from_datetime(last_request_at),
        is_blocked: row.try_get("is_blocked").map_err(corrupt)?,
        blocked_reason: row.try_get("blocked_reason").map_err(corrupt)?,
        created_at: Timestamp::from_datetime(created_at),
        updated_at: Timestamp::from_datetime(updated_at),
    })
}
