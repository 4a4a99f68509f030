//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `ledger` - Usage ledger implementations (PostgreSQL, in-memory)
//! - `auth` - Identity verifier implementations
//! - `clock` - System and manual clocks
//! - `http` - axum middleware and routes

pub mod auth;
pub mod clock;
pub mod http;
pub mod ledger;

pub use auth::InMemoryIdentityVerifier;
pub use clock::{ManualClock, SystemClock};
pub use ledger::{InMemoryUsageLedger, PostgresUsageLedger};
