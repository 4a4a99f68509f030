//! Authentication types for the domain layer.
//!
//! A [`Principal`] is what the identity verifier hands back after checking a
//! bearer credential. It carries no provider details, only the stable user
//! identifier and whether the account has unlocked unlimited access (for
//! example by activating a referral code).
//!
//! # Example
//!
//! ```ignore
//! let principal = verifier.verify(token).await?;
//! request.extensions_mut().insert(Caller::Verified(principal));
//! ```

use super::UserId;
use thiserror::Error;

/// Verified caller identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Stable user identifier from the identity provider.
    pub user_id: UserId,

    /// Whether the account has unlocked unlimited access.
    pub unlocked: bool,
}

impl Principal {
    /// Creates a new principal.
    pub fn new(user_id: UserId, unlocked: bool) -> Self {
        Self { user_id, unlocked }
    }

    /// Principal without unlimited access.
    pub fn locked(user_id: UserId) -> Self {
        Self::new(user_id, false)
    }

    /// Principal with unlimited access.
    pub fn unlocked(user_id: UserId) -> Self {
        Self::new(user_id, true)
    }
}

/// Authentication errors that can occur during credential verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The token is missing, malformed, or has an invalid signature.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// The token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// Token is valid but the user no longer exists.
    #[error("User not found")]
    UserNotFound,

    /// The verification service is unavailable.
    #[error("Auth service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AuthError {
    /// Creates a service unavailable error with a message.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Returns true if this is a transient error that may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::ServiceUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user_id() -> UserId {
        UserId::new("user-123").unwrap()
    }

    #[test]
    fn principal_constructors_set_unlock_flag() {
        assert!(!Principal::locked(test_user_id()).unlocked);
        assert!(Principal::unlocked(test_user_id()).unlocked);
    }

    #[test]
    fn auth_error_invalid_token_displays_correctly() {
        assert_eq!(format!("{}", AuthError::InvalidToken), "Invalid or expired token");
    }

    #[test]
    fn auth_error_service_unavailable_displays_message() {
        let err = AuthError::service_unavailable("Connection refused");
        assert_eq!(format!("{}", err), "Auth service unavailable: Connection refused");
    }

    #[test]
    fn auth_error_is_transient_for_service_errors() {
        assert!(AuthError::service_unavailable("timeout").is_transient());
        assert!(!AuthError::InvalidToken.is_transient());
        assert!(!AuthError::TokenExpired.is_transient());
    }
}
