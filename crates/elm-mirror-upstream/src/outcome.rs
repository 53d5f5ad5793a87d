//! Tagged result of one upstream fetch.

use std::fmt;

/// What happened when fetching one resource.
///
/// Network trouble is data, not an `Err`: the orchestrator dispatches on the
/// variant and decides per identity whether to retry or record a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome<T> {
    /// The resource was fetched.
    Fetched(T),
    /// Upstream answered with a 4xx: this resource is currently unfetchable.
    NotFound { status: u16 },
    /// Timeout, connection failure, 5xx or an unusable body.
    Transient { reason: String },
}

impl<T> FetchOutcome<T> {
    pub fn transient(reason: impl Into<String>) -> Self {
        FetchOutcome::Transient {
            reason: reason.into(),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchOutcome<U> {
        match self {
            FetchOutcome::Fetched(value) => FetchOutcome::Fetched(f(value)),
            FetchOutcome::NotFound { status } => FetchOutcome::NotFound { status },
            FetchOutcome::Transient { reason } => FetchOutcome::Transient { reason },
        }
    }

    /// Chain a fallible step onto a fetched value.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> FetchOutcome<U>) -> FetchOutcome<U> {
        match self {
            FetchOutcome::Fetched(value) => f(value),
            FetchOutcome::NotFound { status } => FetchOutcome::NotFound { status },
            FetchOutcome::Transient { reason } => FetchOutcome::Transient { reason },
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, FetchOutcome::Transient { .. })
    }

    /// Split into the fetched value or the failure.
    pub fn into_result(self) -> Result<T, FetchFailure> {
        match self {
            FetchOutcome::Fetched(value) => Ok(value),
            FetchOutcome::NotFound { status } => Err(FetchFailure::NotFound { status }),
            FetchOutcome::Transient { reason } => Err(FetchFailure::Transient { reason }),
        }
    }

    /// The fetched value, if any.
    pub fn fetched(self) -> Option<T> {
        match self {
            FetchOutcome::Fetched(value) => Some(value),
            _ => None,
        }
    }
}

/// The non-success part of a [`FetchOutcome`], for error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    NotFound { status: u16 },
    Transient { reason: String },
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::NotFound { status } => write!(f, "not found upstream (HTTP {status})"),
            FetchFailure::Transient { reason } => write!(f, "transient upstream error: {reason}"),
        }
    }
}
