//! Data Transfer Objects for quota HTTP endpoints.
//!
//! These types define the JSON request/response shapes for the status,
//! consume and operator routes. They decouple the HTTP layer from the
//! domain types.

use serde::{Deserialize, Serialize};

use crate::application::handlers::quota::{OperatorResult, QuotaStatusResult};
use crate::domain::quota::{QuotaSnapshot, QuotaTier, QuotaUsage};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Query string for `GET /api/v1/quota/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaStatusParams {
    /// Metered path to report on.
    pub endpoint: String,
}

/// Body for `POST /api/v1/quota/consume`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumeRequest {
    /// Metered path to charge one unit against.
    pub endpoint: String,
}

/// Body for `POST /admin/quota/unblock`.
#[derive(Debug, Clone, Deserialize)]
pub struct UnblockRequest {
    pub identity_key: String,
}

/// Body for `POST /admin/quota/reset`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResetUsageRequest {
    pub identity_key: String,
    pub endpoint: String,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Metered usage figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageView {
    pub limit: u32,
    pub used: u32,
    pub remaining: u32,
    /// RFC3339; absent for lifetime windows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<String>,
}

impl From<&QuotaUsage> for UsageView {
    fn from(usage: &QuotaUsage) -> Self {
        Self {
            limit: usage.limit,
            used: usage.used,
            remaining: usage.remaining(),
            reset_at: usage.reset_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Response for the status route.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaStatusResponse {
    pub tier: QuotaTier,
    pub unlimited: bool,
    pub blocked: bool,
    /// Absent for unlimited callers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageView>,
}

impl From<QuotaStatusResult> for QuotaStatusResponse {
    fn from(result: QuotaStatusResult) -> Self {
        Self {
            tier: result.tier,
            unlimited: matches!(result.snapshot, QuotaSnapshot::Unlimited),
            blocked: result.blocked,
            usage: result.snapshot.usage().map(UsageView::from),
        }
    }
}

/// Response for an admitted consume.
#[derive(Debug, Clone, Serialize)]
pub struct ConsumeResponse {
    pub admitted: bool,
    pub tier: QuotaTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageView>,
}

impl ConsumeResponse {
    pub fn admitted(tier: QuotaTier, snapshot: &QuotaSnapshot) -> Self {
        Self {
            admitted: true,
            tier,
            usage: snapshot.usage().map(UsageView::from),
        }
    }
}

/// Response for operator commands.
#[derive(Debug, Clone, Serialize)]
pub struct OperatorResponse {
    pub rows_affected: u64,
}

impl From<OperatorResult> for OperatorResponse {
    fn from(result: OperatorResult) -> Self {
        Self {
            rows_affected: result.rows_affected,
        }
    }
}

/// Standard error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error_code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}
