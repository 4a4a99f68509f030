//! Identity verifier port.
//!
//! Turns a bearer credential into a [`Principal`]. How the credential is
//! checked (JWT, session lookup, remote call) is the adapter's business.
//!
//! # Contract
//!
//! - Return `Ok(principal)` only for a positively verified credential.
//! - Return `AuthError::InvalidToken` / `TokenExpired` / `UserNotFound` for
//!   credentials that are definitively bad.
//! - Return `AuthError::ServiceUnavailable` when verification could not run.
//!
//! Callers treat every error the same way for quota purposes: the request
//! falls back to the most restrictive tier.

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, Principal};

/// Port for verifying caller credentials.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError>;
}
