//! Artifact store error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for artifact operations.
pub type ArtifactResult<T> = Result<T, ArtifactError>;

/// Errors that can occur while materializing or enumerating artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Archive download failed.
    #[error("Download failed: {0}")]
    Download(String),

    /// Archive could not be read.
    #[error("Invalid archive: {0}")]
    Archive(String),

    /// Slug or version cannot be used as a directory name.
    #[error("Invalid path component '{0}'")]
    InvalidPathComponent(String),

    /// The artifact has no download link.
    #[error("No download link for {slug} {version}")]
    MissingDownloadLink { slug: String, version: String },

    /// Artifact directory does not exist.
    #[error("Artifact not found: {0}")]
    NotFound(PathBuf),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
