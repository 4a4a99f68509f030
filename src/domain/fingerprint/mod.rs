//! Fingerprint Generator.
//!
//! Derives a stable pseudonymous identity for callers that present no
//! verified credential. The identity combines the resolved client IP, a
//! normalized device signal and the UTC day the window resets on, so a fresh
//! private-browsing session does not yield a fresh quota while a new day does.
//!
//! # Example
//!
//! ```ignore
//! let signals = ClientSignals::from_peer(peer).with_user_agent(ua);
//! let fp = Fingerprint::generate(&signals, &hasher, clock.now());
//! ledger.get_by_key(&fp.composite_key, endpoint, window_reset_at).await?;
//! ```

mod client_signals;
mod hasher;
mod user_agent;

pub use client_signals::{ClientSignals, UNKNOWN_IP};
pub use hasher::FingerprintHasher;
pub use user_agent::{normalize_user_agent, UNKNOWN_USER_AGENT};

use crate::domain::foundation::Timestamp;

/// Derived pseudo-identity for an unauthenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// Resolved client IP, or [`UNKNOWN_IP`].
    pub ip: String,
    /// Normalized user agent before hashing.
    pub normalized_user_agent: String,
    /// Digest of the normalized user agent.
    pub user_agent_hash: String,
    /// Digest of `ip|normalized_user_agent|reset_day`.
    pub composite_key: String,
    /// Next UTC midnight after `now`.
    pub day_boundary: Timestamp,
}

impl Fingerprint {
    /// Generates the fingerprint for a request observed at `now`.
    pub fn generate(signals: &ClientSignals, hasher: &FingerprintHasher, now: Timestamp) -> Self {
        let ip = signals.resolve_ip_string();
        let normalized_user_agent = normalize_user_agent(signals.user_agent_str());
        let user_agent_hash = hasher.digest(&normalized_user_agent);
        let day_boundary = now.next_utc_midnight();
        let composite_key = hasher.digest(&format!(
            "{}|{}|{}",
            ip,
            normalized_user_agent,
            day_boundary.utc_date_string()
        ));

        Self {
            ip,
            normalized_user_agent,
            user_agent_hash,
            composite_key,
            day_boundary,
        }
    }
}
