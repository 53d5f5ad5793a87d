//! Client for the upstream Elm package server.
//!
//! Fetches package identities, manifests, archives and docs. Every fetch
//! returns a tagged [`FetchOutcome`] (fetched, not-found, transient) instead
//! of an error, and every request waits on a [`RateLimiter`] owned by the
//! caller for the duration of one run.

pub mod client;
pub mod error;
pub mod memory;
pub mod outcome;
pub mod rate_limit;

// Re-exports for convenience.
pub use client::{compute_digest, FetchedArchive, HttpUpstream, Upstream, UpstreamConfig, DEFAULT_UPSTREAM};
pub use error::{Result, UpstreamError};
pub use memory::{MemoryRelease, MemoryUpstream};
pub use outcome::{FetchFailure, FetchOutcome};
pub use rate_limit::RateLimiter;
