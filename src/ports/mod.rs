//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Quota Ports
//!
//! - `UsageLedger` - Durable usage records with atomic conditional increment
//! - `IdentityVerifier` - Bearer credential to principal
//! - `Clock` - Source of the current instant

mod clock;
mod identity_verifier;
mod usage_ledger;

pub use clock::Clock;
pub use identity_verifier::IdentityVerifier;
pub use usage_ledger::{CreateOutcome, IncrementOutcome, LedgerError, UsageLedger};
