//! Upstream client error types.
//!
//! Per-request network trouble is reported through
//! [`FetchOutcome`](crate::FetchOutcome); these errors only cover setting the
//! client up.

/// Errors that prevent the upstream client from being used at all.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// The configured upstream URL is unusable.
    #[error("invalid upstream URL '{url}': {detail}")]
    InvalidUrl { url: String, detail: String },

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Result type alias for upstream client setup.
pub type Result<T> = std::result::Result<T, UpstreamError>;
