//! Bundle export for an Elm package mirror.
//!
//! Repackages a mirror into `.tar.gz` bundles no larger than a byte cap, for
//! distribution through channels with a file size limit. A package directory
//! (all versions of `author/name`) is never split across bundles. The sync
//! log and version index go into a separate metadata bundle.

pub mod archive;
pub mod error;
pub mod plan;

// Re-exports for convenience.
pub use archive::{default_label, export, BundleOutput};
pub use error::{BundleError, Result};
pub use plan::{measure_packages, plan_bundles, Bundle, PackageSize, DEFAULT_MAX_BUNDLE_BYTES};
