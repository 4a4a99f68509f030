//! HTTP adapters - REST API and middleware.

pub mod middleware;
pub mod quota;

// Re-export key types for convenience
pub use middleware::{identity_middleware, quota_middleware, IdentityState, QuotaMiddlewareState};
pub use quota::{quota_router, QuotaAppState};
