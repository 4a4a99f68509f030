//! Axum router configuration for quota endpoints.
//!
//! This module defines the route structure for the quota API and wires
//! it to the handlers.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::adapters::http::middleware::identity::{identity_middleware, IdentityState};

use super::handlers::{
    consume_quota, get_quota_status, reset_usage, unblock_identity, QuotaAppState,
};

/// Create the caller-facing quota router.
///
/// # Routes
/// - `GET /status?endpoint=...` - Current position, consumes nothing
/// - `POST /consume` - Charge one unit, 429/403 when rejected
pub fn quota_routes() -> Router<QuotaAppState> {
    Router::new()
        .route("/status", get(get_quota_status))
        .route("/consume", post(consume_quota))
}

/// Create the operator router.
///
/// Every route requires `X-Admin-Key`; all answer 404 when no key is configured.
///
/// # Routes
/// - `POST /unblock` - Clear the block on an identity key
/// - `POST /reset` - Zero an identity's usage on one endpoint
pub fn admin_routes() -> Router<QuotaAppState> {
    Router::new()
        .route("/unblock", post(unblock_identity))
        .route("/reset", post(reset_usage))
}

/// Create the complete quota service router.
///
/// Mounts caller routes at `/api/v1/quota` and operator routes at
/// `/admin/quota`, behind the identity middleware.
///
/// # Example
///
/// ```ignore
/// let app = quota_router(app_state, verifier)
///     .layer(TraceLayer::new_for_http());
/// ```
pub fn quota_router(state: QuotaAppState, verifier: IdentityState) -> Router {
    Router::new()
        .nest("/api/v1/quota", quota_routes())
        .nest("/admin/quota", admin_routes())
        .with_state(state)
        .layer(middleware::from_fn_with_state(verifier, identity_middleware))
}
