//! Request errors and their HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use elm_mirror_registry::{PackageIdentity, RegistryError};

/// Why a request could not be answered with content.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Malformed path, unknown file, or an absent optional artifact.
    #[error("not found")]
    NotFound,

    /// The release has no success record in the sync log.
    #[error("{0} is not mirrored")]
    NotMirrored(PackageIdentity),

    /// Reading the mirror failed.
    #[error("mirror read failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("mirror read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("mirror read task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::NotMirrored(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Registry(_) | ServerError::Io(_) | ServerError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ServerError::NotFound => {}
            ServerError::NotMirrored(identity) => tracing::debug!("{identity}: requested but not mirrored"),
            ServerError::Registry(_) | ServerError::Io(_) | ServerError::Task(_) => tracing::error!("{self}"),
        }
        (status, self.to_string()).into_response()
    }
}
