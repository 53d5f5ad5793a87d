//! Bundle export error types.

use std::path::PathBuf;

use elm_mirror_registry::RegistryError;

/// Errors that can occur while exporting bundles.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("mirror error: {0}")]
    Registry(#[from] RegistryError),

    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BundleError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| BundleError::Io { action, path, source }
    }
}

/// Result type alias for bundle operations.
pub type Result<T> = std::result::Result<T, BundleError>;
