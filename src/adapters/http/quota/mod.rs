//! HTTP adapter for quota endpoints.
//!
//! Exposes the quota engine via REST API:
//! - `GET /api/v1/quota/status` - Current quota position for the caller
//! - `POST /api/v1/quota/consume` - Charge one unit for the caller
//! - `POST /admin/quota/unblock` - Lift a block (operator)
//! - `POST /admin/quota/reset` - Zero usage in the live window (operator)

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::ErrorResponse;
pub use handlers::{QuotaApiError, QuotaAppState, X_ADMIN_KEY};
pub use routes::{admin_routes, quota_router, quota_routes};
