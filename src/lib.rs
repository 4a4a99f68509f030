//! Tiered Quota - request quota engine for anonymous and signed-in callers
//!
//! Classifies each caller into a tier, resolves the tier's quota policy and
//! enforces it against a persisted usage ledger, so limits hold across
//! restarts and horizontally scaled instances.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
