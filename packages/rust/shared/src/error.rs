//! Error types for docbridge.
//!
//! Library crates use [`DocBridgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all docbridge operations.
#[derive(Debug, thiserror::Error)]
pub enum DocBridgeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP transport error (connection reset, timeout, DNS).
    #[error("network error: {0}")]
    Network(String),

    /// The remote API answered with a non-success status.
    #[error("remote API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Persisted state could not be read or written. Fatal for a run.
    #[error("storage error: {0}")]
    Storage(String),

    /// Local content for an ID is unusable (unreadable or empty).
    #[error("content error for {id}: {message}")]
    Content { id: String, message: String },

    /// The table store rejected a batch write.
    #[error("table write rejected: {0}")]
    TableWrite(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DocBridgeError>;

impl DocBridgeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a content error for the given ID.
    pub fn content(id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Content {
            id: id.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether retrying the same call later may succeed (network trouble,
    /// rate limiting, server-side failures).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
