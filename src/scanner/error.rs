//! Scanner error types.

use thiserror::Error;

/// Result type for scanner operations.
pub type ScanResult<T> = Result<T, ScanError>;

/// Errors that can occur while running a scanner.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The scanner executable could not be started.
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The scanner exited unsuccessfully.
    #[error("Scanner exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    /// The scanner output could not be decoded.
    #[error("Failed to decode scanner output: {0}")]
    Decode(#[from] serde_json::Error),

    /// Invalid scan target.
    #[error("Invalid scan target: {0}")]
    Target(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
