//! Error types for cacher
//!
//! All modules use `CacherResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cacher operations
pub type CacherResult<T> = Result<T, CacherError>;

/// All errors that can occur in cacher
#[derive(Error, Debug)]
pub enum CacherError {
    // Pattern errors
    #[error("Invalid file pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    // Archive errors
    #[error("Archive error: {context}")]
    Archive {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected bytes written for {path}: wrote {written}, want {expected}")]
    ArchiveSizeMismatch {
        path: PathBuf,
        written: u64,
        expected: u64,
    },

    #[error("{path} shrank while being archived: read {read} of {expected} bytes")]
    ArchiveShortRead {
        path: PathBuf,
        read: u64,
        expected: u64,
    },

    #[error("Refusing to extract entry outside the destination: {name}")]
    ArchiveUnsafePath { name: String },

    // Store errors
    #[error("Cache object not found: {0}")]
    BlobNotFound(String),

    #[error("Blob store error: {0}")]
    Store(String),

    #[error("Blob store returned HTTP {status} for {url}: {body}")]
    StoreStatus {
        status: u16,
        url: String,
        body: String,
    },

    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: ureq::Error,
    },

    // Credential errors
    #[error("GCP not authenticated. Run: gcloud auth login")]
    GcpNotAuthenticated,

    #[error("GCP credential error: {0}")]
    GcpCredential(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Missing required option: {0}")]
    MissingOption(String),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacherError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an archive stream error with context
    pub fn archive(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Archive {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create an HTTP transport error
    pub fn http(url: impl Into<String>, source: ureq::Error) -> Self {
        Self::Http {
            url: url.into(),
            source,
        }
    }

    /// Check if the error means the requested object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::BlobNotFound(_))
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::GcpNotAuthenticated => Some("Run: gcloud auth login"),
            Self::StoreStatus { status: 401, .. } | Self::StoreStatus { status: 403, .. } => {
                Some("Check that the credentials can read and write the bucket")
            }
            Self::MissingOption(_) => Some("Run: cacher --help"),
            Self::Pattern { .. } => Some("Patterns use shell glob syntax: *, ? and [...]"),
            _ => None,
        }
    }
}
