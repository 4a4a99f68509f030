//! Usage ledger adapters.
//!
//! Implementations of the UsageLedger port for different backends.
//!
//! ## Available Adapters
//!
//! - `InMemoryUsageLedger` - In-memory for testing and single-process development
//! - `PostgresUsageLedger` - PostgreSQL-backed for production multi-instance
//!
//! ## Usage
//!
//! ```ignore
//! use tiered_quota::adapters::ledger::{InMemoryUsageLedger, PostgresUsageLedger};
//!
//! // For testing
//! let ledger = InMemoryUsageLedger::new();
//!
//! // For production
//! let ledger = PostgresUsageLedger::new(pool);
//! ```

mod in_memory;
mod postgres;

pub use in_memory::{InMemoryUsageLedger, LedgerOperation};
pub use postgres::PostgresUsageLedger;
