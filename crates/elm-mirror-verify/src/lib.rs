//! Integrity verification for an Elm package mirror.
//!
//! Re-walks every release the sync log records as successful, recomputes the
//! archive digest and compares it against the stored integrity record. The
//! walk is read-only and may run while a sync or the server is active.

pub mod error;
pub mod report;
pub mod walk;

// Re-exports for convenience.
pub use error::{Result, VerifyError};
pub use report::{Finding, Problem, VerifyReport};
pub use walk::{check_release, verify_mirror};
