//! Quota enforcement middleware for axum.
//!
//! Runs the `QuotaGuard` for every request on the wrapped routes, keyed by
//! the request path. Expects `identity_middleware` to sit outside it; without
//! it every caller is treated as anonymous.
//!
//! Quota status is returned in standard HTTP headers on metered responses:
//! - `X-RateLimit-Limit`: Maximum requests allowed in the window
//! - `X-RateLimit-Remaining`: Requests remaining in the window
//! - `X-RateLimit-Reset`: RFC3339 instant the window resets (resetting windows only)
//! - `Retry-After`: Seconds to wait (only on a daily-limit 429)
//!
//! Unlimited callers and blocked callers get no quota headers.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::post, middleware};
//! use std::sync::Arc;
//!
//! let guard: Arc<QuotaGuard> = Arc::new(QuotaGuard::new(enforcer));
//!
//! let app = Router::new()
//!     .route("/api/v1/agent/reply", post(reply))
//!     .layer(middleware::from_fn_with_state(guard, quota_middleware))
//!     .layer(middleware::from_fn_with_state(verifier, identity_middleware));
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::adapters::http::quota::dto::ErrorResponse;
use crate::application::handlers::quota::{QuotaGuard, QuotaRequest};
use crate::domain::foundation::{ErrorCode, Timestamp};
use crate::domain::quota::{Endpoint, QuotaDecision, QuotaError, QuotaUsage, RejectReason};

use super::identity::{caller_from, signals_from};

/// Quota middleware state.
pub type QuotaMiddlewareState = Arc<QuotaGuard>;

/// Standard rate limit header names.
pub mod headers {
    use super::HeaderName;

    /// Maximum requests allowed in the window.
    pub static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
    /// Requests remaining in the current window.
    pub static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
    /// RFC3339 instant the window resets.
    pub static X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
}

/// Enforces the caller's quota on the request path.
///
/// 1. Builds a `QuotaRequest` from the caller, client signals and path
/// 2. Runs the guard (enforcer, then abuse detector)
/// 3. Admitted - runs the inner service and adds quota headers
/// 4. Rejected - answers 429 or 403 without touching the inner service
/// 5. Ledger unavailable - answers 503
pub async fn quota_middleware(
    State(guard): State<QuotaMiddlewareState>,
    request: Request,
    next: Next,
) -> Response {
    let endpoint = match Endpoint::new(request.uri().path()) {
        Ok(endpoint) => endpoint,
        Err(e) => return quota_error_response(&QuotaError::from(e)),
    };

    let quota_request = QuotaRequest {
        caller: caller_from(request.extensions()),
        signals: signals_from(request.headers(), request.extensions()),
        endpoint,
    };

    let enforcement = match guard.check(&quota_request).await {
        Ok(enforcement) => enforcement,
        Err(e) => return quota_error_response(&e),
    };

    match enforcement.decision {
        QuotaDecision::Admit(snapshot) => {
            let mut response = next.run(request).await;
            if let Some(usage) = snapshot.usage() {
                apply_quota_headers(response.headers_mut(), usage);
            }
            response
        }
        QuotaDecision::Reject(reason) => rejection_response(&reason, guard.clock().now()),
    }
}

/// Writes the limit, remaining and reset headers for a metered usage.
pub fn apply_quota_headers(headers: &mut HeaderMap, usage: &QuotaUsage) {
    headers.insert(
        headers::X_RATELIMIT_LIMIT.clone(),
        HeaderValue::from(usage.limit),
    );
    headers.insert(
        headers::X_RATELIMIT_REMAINING.clone(),
        HeaderValue::from(usage.remaining()),
    );
    if let Some(reset_at) = usage.reset_at {
        if let Ok(value) = HeaderValue::from_str(&reset_at.to_rfc3339()) {
            headers.insert(headers::X_RATELIMIT_RESET.clone(), value);
        }
    }
}

/// Builds the 429/403 response for a rejection.
///
/// Blocked callers get a fixed message and no counts, so the stored block
/// reason never leaves the service.
pub fn rejection_response(reason: &RejectReason, now: Timestamp) -> Response {
    let (status, body, retry_after) = match *reason {
        RejectReason::DailyLimitExceeded {
            used,
            limit,
            reset_at,
        } => {
            let reset_in_secs = reset_at.duration_since(&now).num_seconds().max(0);
            let details = serde_json::json!({
                "used": used,
                "limit": limit,
                "reset_at": reset_at.to_rfc3339(),
                "reset_in_secs": reset_in_secs,
                "reset_hours": reset_in_secs / 3600,
                "reset_mins": (reset_in_secs % 3600) / 60,
            });
            (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorResponse::with_details(reason.code().as_str(), reason.message(), details),
                Some(reset_in_secs),
            )
        }
        RejectReason::TrialLimitExceeded { used, limit } => (
            StatusCode::TOO_MANY_REQUESTS,
            ErrorResponse::with_details(
                reason.code().as_str(),
                reason.message(),
                serde_json::json!({ "used": used, "limit": limit }),
            ),
            None,
        ),
        RejectReason::Blocked => (
            StatusCode::FORBIDDEN,
            ErrorResponse::new(reason.code().as_str(), reason.message()),
            None,
        ),
    };

    let mut response = (status, Json(body)).into_response();
    if let Some(usage) = reason.usage() {
        apply_quota_headers(response.headers_mut(), &usage);
    }
    if let Some(secs) = retry_after {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}

/// Maps a quota error to a response. Storage detail never reaches the body.
pub fn quota_error_response(error: &QuotaError) -> Response {
    let (status, body) = match error {
        QuotaError::LedgerUnavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorResponse::new(
                ErrorCode::QuotaUnavailable.as_str(),
                "Quota service temporarily unavailable",
            ),
        ),
        QuotaError::Invalid(e) => (
            StatusCode::BAD_REQUEST,
            ErrorResponse::new(ErrorCode::ValidationFailed.as_str(), e.to_string()),
        ),
    };
    (status, Json(body)).into_response()
}
