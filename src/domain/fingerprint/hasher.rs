//! Digest used for user-agent hashes and composite keys.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded SHA-256 digest, optionally keyed with a server-side pepper.
///
/// With a secret configured the digest is HMAC-SHA256, so ledger keys cannot
/// be recomputed from a guessed IP and user agent without the pepper.
#[derive(Clone, Default)]
pub struct FingerprintHasher {
    secret: Option<Arc<SecretString>>,
}

impl FingerprintHasher {
    /// Plain SHA-256 hasher.
    pub fn new() -> Self {
        Self { secret: None }
    }

    /// HMAC-SHA256 hasher keyed with `secret`.
    pub fn with_secret(secret: SecretString) -> Self {
        Self {
            secret: Some(Arc::new(secret)),
        }
    }

    /// Builds a hasher from an optional configured secret.
    pub fn from_optional(secret: Option<SecretString>) -> Self {
        Self {
            secret: secret.map(Arc::new),
        }
    }

    pub fn is_keyed(&self) -> bool {
        self.secret.is_some()
    }

    /// Returns the lowercase hex digest of `input`.
    pub fn digest(&self, input: &str) -> String {
        match &self.secret {
            Some(secret) => {
                match HmacSha256::new_from_slice(secret.expose_secret().as_bytes()) {
                    Ok(mut mac) => {
                        mac.update(input.as_bytes());
                        hex::encode(mac.finalize().into_bytes())
                    }
                    // HMAC accepts keys of any length
                    Err(_) => hex::encode(Sha256::digest(input.as_bytes())),
                }
            }
            None => hex::encode(Sha256::digest(input.as_bytes())),
        }
    }
}

impl std::fmt::Debug for FingerprintHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintHasher")
            .field("keyed", &self.is_keyed())
            .finish()
    }
}
