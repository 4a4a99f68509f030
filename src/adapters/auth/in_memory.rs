//! In-memory identity verifier.
//!
//! Maps opaque bearer tokens to principals. Backs tests and local
//! development (`auth.dev_tokens`); production deployments plug a real
//! verifier into the `IdentityVerifier` port instead.
//!
//! # Example
//!
//! ```ignore
//! use tiered_quota::adapters::auth::InMemoryIdentityVerifier;
//!
//! let verifier = InMemoryIdentityVerifier::new()
//!     .with_user("free-token", "user-1", false)
//!     .with_user("referral-token", "user-2", true);
//!
//! let principal = verifier.verify("referral-token").await?;
//! assert!(principal.unlocked);
//! ```

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::foundation::{AuthError, Principal, UserId, ValidationError};
use crate::ports::IdentityVerifier;

/// Token-to-principal map. Unknown tokens are `InvalidToken`.
#[derive(Debug, Default, Clone)]
pub struct InMemoryIdentityVerifier {
    tokens: HashMap<String, Principal>,
    force_error: Option<AuthError>,
}

impl InMemoryIdentityVerifier {
    /// Creates a verifier that accepts no tokens.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token for a principal.
    pub fn with_principal(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.tokens.insert(token.into(), principal);
        self
    }

    /// Registers a token for a user id, failing on an empty id.
    pub fn try_with_user(
        self,
        token: impl Into<String>,
        user_id: impl Into<String>,
        unlocked: bool,
    ) -> Result<Self, ValidationError> {
        let principal = Principal::new(UserId::new(user_id)?, unlocked);
        Ok(self.with_principal(token, principal))
    }

    /// Registers a token for a user id. Empty ids are ignored.
    pub fn with_user(
        self,
        token: impl Into<String>,
        user_id: impl Into<String>,
        unlocked: bool,
    ) -> Self {
        let token = token.into();
        match UserId::new(user_id) {
            Ok(id) => self.with_principal(token, Principal::new(id, unlocked)),
            Err(_) => self,
        }
    }

    /// Forces every verification to fail with `error`.
    pub fn with_error(mut self, error: AuthError) -> Self {
        self.force_error = Some(error);
        self
    }

    /// Returns the number of registered tokens.
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

#[async_trait]
impl IdentityVerifier for InMemoryIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        if let Some(error) = &self.force_error {
            return Err(error.clone());
        }

        self.tokens
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}
