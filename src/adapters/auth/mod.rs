//! Authentication adapters.
//!
//! Implementations of the `IdentityVerifier` port:
//!
//! - `in_memory` - Static token map for tests and local development

mod in_memory;

pub use in_memory::InMemoryIdentityVerifier;
