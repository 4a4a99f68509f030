//! Metered endpoint name.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::ValidationError;

const MAX_ENDPOINT_LEN: usize = 255;

/// Logical API path being metered, e.g. `/api/v1/agent/reply`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint(String);

impl Endpoint {
    /// Creates an endpoint, rejecting empty, relative, or oversized paths.
    pub fn new(path: impl Into<String>) -> Result<Self, ValidationError> {
        let path = path.into();
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::empty_field("endpoint"));
        }
        if !trimmed.starts_with('/') {
            return Err(ValidationError::invalid_format("endpoint", "must start with '/'"));
        }
        if trimmed.len() > MAX_ENDPOINT_LEN {
            return Err(ValidationError::out_of_range(
                "endpoint",
                1,
                MAX_ENDPOINT_LEN as i64,
                trimmed.len() as i64,
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Endpoint {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
