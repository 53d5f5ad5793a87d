//! Registry store error types.

use std::path::PathBuf;

/// Errors that can occur while reading or writing the mirror layout.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A package identity or package name failed validation.
    #[error("invalid package identity '{input}': {detail}")]
    InvalidIdentity { input: String, detail: String },

    /// The sync log exists but cannot be trusted.
    #[error("corrupt sync log at {path}: {detail}")]
    CorruptLog { path: PathBuf, detail: String },

    /// The version index exists but cannot be parsed.
    #[error("corrupt version index at {path}: {detail}")]
    CorruptIndex { path: PathBuf, detail: String },

    /// An integrity record is malformed.
    #[error("invalid integrity record at {path}: {detail}")]
    InvalidIntegrity { path: PathBuf, detail: String },

    /// Local storage failure (disk full, permission denied, ...).
    #[error("storage error at {path}: {detail}")]
    Storage { path: PathBuf, detail: String },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    pub(crate) fn storage(path: impl Into<PathBuf>, action: &str, err: impl std::fmt::Display) -> Self {
        RegistryError::Storage {
            path: path.into(),
            detail: format!("{action}: {err}"),
        }
    }

    /// Whether this error means the local disk is unusable (as opposed to
    /// bad input or bad content).
    pub fn is_storage(&self) -> bool {
        matches!(self, RegistryError::Storage { .. } | RegistryError::Io(_))
    }
}

/// Result type alias for registry store operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
