//! Registry store for an Elm package mirror.
//!
//! Owns the mirror's on-disk layout and its two persisted structures:
//!
//! - **Sync log** (`registry.json`): append-only history of every sync
//!   attempt; the source of truth for what has been mirrored.
//! - **Version index** (`all-packages`): derived mapping of package names to
//!   known versions, rebuildable from the log plus the upstream universe.
//!
//! Package directories hold the manifest, integrity record, archive and
//! optional docs for one release. All writes are atomic per file.

pub mod endpoint;
pub mod error;
pub mod identity;
pub mod index;
pub mod integrity;
pub mod log;
pub mod store;

// Re-exports for convenience.
pub use endpoint::EndpointDescriptor;
pub use error::{RegistryError, Result};
pub use identity::{PackageIdentity, PackageName};
pub use index::VersionIndex;
pub use integrity::{ContentHash, DigestAlgorithm, IntegrityRecord};
pub use log::{PackageRecord, SyncLog, SyncStatus};
pub use store::{Artifact, MirrorStore, StoredVersion};
