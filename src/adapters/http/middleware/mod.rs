//! HTTP middleware for axum.
//!
//! This module contains middleware layers for cross-cutting concerns:
//!
//! - `identity` - Caller classification and client signal extraction
//! - `quota` - Quota enforcement, quota headers and rejection responses

pub mod identity;
pub mod quota;

pub use identity::{client_signals, identity_middleware, CallerIdentity, ClientInfo, IdentityState};
pub use quota::{
    apply_quota_headers, quota_error_response, quota_middleware, rejection_response,
    QuotaMiddlewareState,
};
