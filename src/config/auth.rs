//! Authentication configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

const MIN_ADMIN_KEY_LEN: usize = 16;

/// Operator key and development identity settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Key expected in `X-Admin-Key`; admin routes are disabled when unset
    #[serde(default)]
    pub admin_api_key: Option<SecretString>,

    /// Static bearer tokens, `token=user_id[:unlocked]` comma separated
    #[serde(default)]
    pub dev_tokens: Option<String>,
}

/// One parsed development token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevToken {
    pub token: String,
    pub user_id: String,
    pub unlocked: bool,
}

impl AuthConfig {
    /// Parse `dev_tokens` into entries.
    pub fn dev_token_list(&self) -> Result<Vec<DevToken>, ValidationError> {
        let Some(raw) = self.dev_tokens.as_deref() else {
            return Ok(Vec::new());
        };

        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(parse_dev_token)
            .collect()
    }

    /// Validate authentication configuration
    ///
    /// Dev tokens are refused in production, and a configured admin key must
    /// be long enough to resist guessing.
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        if let Some(key) = &self.admin_api_key {
            if key.expose_secret().len() < MIN_ADMIN_KEY_LEN {
                return Err(ValidationError::AdminKeyTooShort(MIN_ADMIN_KEY_LEN));
            }
        }

        let tokens = self.dev_token_list()?;
        if *environment == Environment::Production && !tokens.is_empty() {
            return Err(ValidationError::DevTokensInProduction);
        }

        Ok(())
    }
}

fn parse_dev_token(entry: &str) -> Result<DevToken, ValidationError> {
    let invalid = || ValidationError::InvalidDevToken(entry.to_string());

    let (token, identity) = entry.split_once('=').ok_or_else(invalid)?;
    let (user_id, unlocked) = match identity.split_once(':') {
        Some((user_id, "unlocked")) => (user_id, true),
        Some(_) => return Err(invalid()),
        None => (identity, false),
    };

    let token = token.trim();
    let user_id = user_id.trim();
    if token.is_empty() || user_id.is_empty() {
        return Err(invalid());
    }

    Ok(DevToken {
        token: token.to_string(),
        user_id: user_id.to_string(),
        unlocked,
    })
}
