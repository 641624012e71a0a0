//! Registry error types.

use thiserror::Error;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur while talking to the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Transport-level failure (DNS, TLS, timeout, ...).
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status.
    #[error("Registry returned HTTP {status} for {url}")]
    Http { status: u16, url: String },

    /// Response body did not match the expected format.
    #[error("Invalid registry response: {0}")]
    InvalidResponse(String),

    /// The registry does not know the plugin.
    #[error("Plugin '{slug}' not found: {reason}")]
    NotFound { slug: String, reason: String },
}

impl From<reqwest::Error> for RegistryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}
