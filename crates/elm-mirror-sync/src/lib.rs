//! Incremental sync of an Elm package mirror.
//!
//! The [`Orchestrator`] brings a mirror up to date with a [`DesiredSet`],
//! appending to the sync log without ever rewriting history. The
//! [`backfill_docs`] utility fills in optional docs for releases that were
//! mirrored without them.

pub mod backfill;
pub mod desired;
pub mod error;
pub mod orchestrator;

// Re-exports for convenience.
pub use backfill::{backfill_docs, BackfillReport};
pub use desired::{DesiredSet, PackageSelector};
pub use error::{Result, SyncError};
pub use orchestrator::{Orchestrator, SyncOptions, SyncOutcome, SyncReport};
