//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, and error types
//! that form the vocabulary of the quota domain.

mod auth;
mod errors;
mod ids;
mod timestamp;

pub use auth::{AuthError, Principal};
pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{UsageRecordId, UserId};
pub use timestamp::Timestamp;
