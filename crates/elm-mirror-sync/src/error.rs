//! Sync error types.
//!
//! Only run-fatal conditions are errors. A single identity that cannot be
//! fetched is recorded as a failed log entry and reported in the
//! [`SyncReport`](crate::SyncReport) instead.

use std::path::PathBuf;

use elm_mirror_registry::RegistryError;

/// Errors that abort a sync run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Local storage failed; continuing could lose fetched data.
    #[error("mirror storage error: {0}")]
    Storage(#[from] RegistryError),

    /// The upstream package listing was needed but could not be fetched.
    #[error("could not list upstream packages: {detail}")]
    Listing { detail: String },

    /// The desired package list could not be read.
    #[error("invalid package list {path}: {detail}")]
    PackageList { path: PathBuf, detail: String },
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
