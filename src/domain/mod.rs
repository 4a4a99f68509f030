//! Domain layer - Core business logic with no infrastructure dependencies.
//!
//! - `foundation` - Shared value objects, identifiers, and errors
//! - `fingerprint` - Pseudonymous identity for unauthenticated callers
//! - `quota` - Tiers, policies, usage records, and admission rules

pub mod fingerprint;
pub mod foundation;
pub mod quota;
