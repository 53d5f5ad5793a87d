//! Verification error types.

use elm_mirror_registry::RegistryError;

/// Errors that stop a verification walk before it starts.
///
/// Problems with individual releases are findings in the
/// [`VerifyReport`](crate::VerifyReport), not errors.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("cannot read mirror: {0}")]
    Registry(#[from] RegistryError),
}

/// Result type alias for verification operations.
pub type Result<T> = std::result::Result<T, VerifyError>;
