//! Error types for profile-enrich
//!
//! This module provides the error hierarchy used throughout the library:
//! - [`Error`]: the crate-wide error returned by fallible operations
//! - [`DatabaseError`]: persistence failures with a human-readable context
//! - [`UploadError`]: artifact store failures (download, rejection, local I/O)
//!
//! Upstream fetch failures are *not* errors: they are classified into
//! [`FetchOutcome`](crate::fetch::FetchOutcome) variants so the pipeline can
//! dispatch on them exhaustively.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for profile-enrich operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for profile-enrich
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "pacing.baseline")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Artifact store failure
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Artifact store errors
///
/// Every variant means nothing was linked: the record keeps its previous
/// artifact reference.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The source image could not be downloaded
    #[error("failed to download {url}: {reason}")]
    Download {
        /// The image URL that was requested
        url: String,
        /// Why the download failed
        reason: String,
    },

    /// The hosting service refused the upload
    #[error("upload rejected with status {status}: {message}")]
    Rejected {
        /// HTTP status returned by the service
        status: u16,
        /// Error message reported by the service
        message: String,
    },

    /// The hosting service answered with something we could not interpret
    #[error("invalid upload response: {0}")]
    InvalidResponse(String),

    /// Writing the artifact to local storage failed
    #[error("failed to store artifact at {path}: {reason}")]
    Storage {
        /// Destination path of the artifact
        path: PathBuf,
        /// Why the write failed
        reason: String,
    },
}
