//! The mirror's on-disk layout.
//!
//! Layout:
//! ```text
//! <root>/
//!   registry.json       : append-only sync log
//!   all-packages        : derived version index
//!   packages/
//!     <author>/
//!       <name>/
//!         <version>/
//!           elm.json    : manifest
//!           hash.json   : integrity record
//!           package.zip : source archive
//!           docs.json   : API docs (optional)
//! ```
//!
//! Every file is replaced atomically: bytes go to a temporary file in the
//! destination directory, are flushed to disk, then renamed over the target.
//! Readers therefore see either the previous complete file or the next one.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{RegistryError, Result};
use crate::identity::{PackageIdentity, PackageName};
use crate::index::VersionIndex;
use crate::integrity::IntegrityRecord;
use crate::log::{PackageRecord, SyncLog};

/// File name of the sync log.
pub const LOG_FILE: &str = "registry.json";
/// File name of the version index.
pub const INDEX_FILE: &str = "all-packages";
/// Directory holding package directories.
pub const PACKAGES_DIR: &str = "packages";

/// One file of a package directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    Manifest,
    Integrity,
    Archive,
    Docs,
}

impl Artifact {
    /// Artifacts that must all exist for a release to count as mirrored.
    pub const REQUIRED: [Artifact; 3] = [Artifact::Manifest, Artifact::Integrity, Artifact::Archive];

    pub fn file_name(self) -> &'static str {
        match self {
            Artifact::Manifest => "elm.json",
            Artifact::Integrity => "hash.json",
            Artifact::Archive => "package.zip",
            Artifact::Docs => "docs.json",
        }
    }

    pub fn is_required(self) -> bool {
        self != Artifact::Docs
    }
}

/// A version directory found by [`MirrorStore::scan_versions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredVersion {
    pub identity: PackageIdentity,
    pub has_manifest: bool,
    pub has_docs: bool,
}

/// A mirror rooted at a directory.
#[derive(Debug, Clone)]
pub struct MirrorStore {
    root: PathBuf,
}

impl MirrorStore {
    /// Open a mirror at `root` without touching the filesystem.
    pub fn new(root: PathBuf) -> Self {
        MirrorStore { root }
    }

    /// Open a mirror at `root`, creating the directory skeleton if needed.
    pub fn create(root: PathBuf) -> Result<Self> {
        let packages = root.join(PACKAGES_DIR);
        std::fs::create_dir_all(&packages)
            .map_err(|e| RegistryError::storage(&packages, "creating mirror directory", e))?;
        Ok(MirrorStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(LOG_FILE)
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.root.join(PACKAGES_DIR)
    }

    pub fn package_dir(&self, identity: &PackageIdentity) -> PathBuf {
        self.packages_dir().join(identity.relative_dir())
    }

    pub fn artifact_path(&self, identity: &PackageIdentity, artifact: Artifact) -> PathBuf {
        self.package_dir(identity).join(artifact.file_name())
    }

    /// Load the sync log. A missing log is an empty log.
    pub fn load_log(&self) -> Result<SyncLog> {
        let path = self.log_path();
        let Some(bytes) = read_optional(&path)? else {
            return Ok(SyncLog::new());
        };
        SyncLog::from_bytes(&bytes).map_err(|e| RegistryError::CorruptLog {
            path,
            detail: e.to_string(),
        })
    }

    /// Append records to the log and return its new length.
    ///
    /// The prior log is re-read and the whole file is replaced atomically.
    /// With no records the file is left untouched.
    pub fn append_log(&self, records: &[PackageRecord]) -> Result<usize> {
        let mut log = self.load_log()?;
        if records.is_empty() {
            return Ok(log.len());
        }
        log.append(records.iter().cloned());
        write_atomic(&self.log_path(), &log.to_bytes()?)?;
        Ok(log.len())
    }

    /// Load the version index, or `None` if it has not been generated.
    pub fn load_index(&self) -> Result<Option<VersionIndex>> {
        let path = self.index_path();
        let Some(bytes) = read_optional(&path)? else {
            return Ok(None);
        };
        VersionIndex::from_bytes(&bytes)
            .map(Some)
            .map_err(|e| RegistryError::CorruptIndex {
                path,
                detail: e.to_string(),
            })
    }

    pub fn write_index(&self, index: &VersionIndex) -> Result<()> {
        write_atomic(&self.index_path(), &index.to_bytes()?)
    }

    /// Atomically write one artifact, creating the package directory.
    pub fn write_artifact(&self, identity: &PackageIdentity, artifact: Artifact, bytes: &[u8]) -> Result<()> {
        write_atomic(&self.artifact_path(identity, artifact), bytes)
    }

    /// Read one artifact, or `None` if it does not exist.
    pub fn read_artifact(&self, identity: &PackageIdentity, artifact: Artifact) -> Result<Option<Vec<u8>>> {
        read_optional(&self.artifact_path(identity, artifact))
    }

    pub fn has_artifact(&self, identity: &PackageIdentity, artifact: Artifact) -> bool {
        self.artifact_path(identity, artifact).is_file()
    }

    pub fn write_integrity(&self, identity: &PackageIdentity, record: &IntegrityRecord) -> Result<()> {
        self.write_artifact(identity, Artifact::Integrity, &serde_json::to_vec(record)?)
    }

    /// Read and validate `hash.json`.
    pub fn read_integrity(&self, identity: &PackageIdentity) -> Result<Option<IntegrityRecord>> {
        let path = self.artifact_path(identity, Artifact::Integrity);
        let Some(bytes) = read_optional(&path)? else {
            return Ok(None);
        };
        let record: IntegrityRecord =
            serde_json::from_slice(&bytes).map_err(|e| RegistryError::InvalidIntegrity {
                path: path.clone(),
                detail: e.to_string(),
            })?;
        record
            .validate()
            .map_err(|detail| RegistryError::InvalidIntegrity { path, detail })?;
        Ok(Some(record))
    }

    /// Whether every required artifact of a release is present.
    pub fn is_complete(&self, identity: &PackageIdentity) -> bool {
        Artifact::REQUIRED
            .iter()
            .all(|a| self.has_artifact(identity, *a))
    }

    /// Every `author/name` directory under `packages/`, sorted.
    pub fn scan_packages(&self) -> Result<Vec<PackageName>> {
        let mut packages = Vec::new();
        for author in list_dirs(&self.packages_dir())? {
            for name in list_dirs(&self.packages_dir().join(&author))? {
                match PackageName::new(&author, &name) {
                    Ok(package) => packages.push(package),
                    Err(e) => tracing::warn!("skipping package directory: {e}"),
                }
            }
        }
        packages.sort();
        Ok(packages)
    }

    /// Every version directory under `packages/`, sorted by identity.
    pub fn scan_versions(&self) -> Result<Vec<StoredVersion>> {
        let mut versions = Vec::new();
        for package in self.scan_packages()? {
            let dir = self.packages_dir().join(package.author()).join(package.name());
            for version in list_dirs(&dir)? {
                let identity = match package.at(&version) {
                    Ok(identity) => identity,
                    Err(e) => {
                        tracing::warn!("skipping version directory: {e}");
                        continue;
                    }
                };
                versions.push(StoredVersion {
                    has_manifest: self.has_artifact(&identity, Artifact::Manifest),
                    has_docs: self.has_artifact(&identity, Artifact::Docs),
                    identity,
                });
            }
        }
        versions.sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(versions)
    }
}

/// Replace `path` with `bytes` via a flushed temporary file and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| RegistryError::storage(dir, "creating directory", e))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| RegistryError::storage(dir, "creating temporary file", e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| RegistryError::storage(path, "writing temporary file", e))?;
    tmp.persist(path)
        .map_err(|e| RegistryError::storage(path, "replacing file", e.error))?;
    Ok(())
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RegistryError::storage(path, "reading file", e)),
    }
}

fn list_dirs(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|e| RegistryError::storage(dir, "listing directory", e))?;
    for entry in entries {
        let entry = entry.map_err(|e| RegistryError::storage(dir, "reading entry", e))?;
        if entry.path().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> PackageIdentity {
        s.parse().unwrap()
    }

    fn store_complete(store: &MirrorStore, identity: &PackageIdentity, archive: &[u8]) {
        store
            .write_artifact(identity, Artifact::Manifest, b"{\"name\":\"elm/core\"}")
            .unwrap();
        store.write_artifact(identity, Artifact::Archive, archive).unwrap();
        store
            .write_integrity(identity, &IntegrityRecord::for_archive(archive))
            .unwrap();
    }

    #[test]
    fn create_builds_skeleton() {
        let dir = tempfile::tempdir().unwrap();
        let store = MirrorStore::create(dir.path().join("mirror")).unwrap();
        assert!(store.packages_dir().is_dir());
        assert!(store.load_log().unwrap().is_empty());
        assert!(store.load_index().unwrap().is_none());
    }

    #[test]
    fn artifacts_and_completeness() {
        let dir = tempfile::tempdir().unwrap();
        let store = MirrorStore::create(dir.path().to_path_buf()).unwrap();
        let core = id("elm/core@1.0.5");

        assert!(!store.is_complete(&core));
        store.write_artifact(&core, Artifact::Manifest, b"{}").unwrap();
        assert!(!store.is_complete(&core));

        store_complete(&store, &core, b"zip");
        assert!(store.is_complete(&core));
        assert!(dir.path().join("packages/elm/core/1.0.5/package.zip").is_file());
        assert_eq!(
            store.read_artifact(&core, Artifact::Archive).unwrap().as_deref(),
            Some(&b"zip"[..])
        );
        assert!(store.read_artifact(&core, Artifact::Docs).unwrap().is_none());

        let record = store.read_integrity(&core).unwrap().unwrap();
        assert!(record.verify(b"zip"));
    }

    #[test]
    fn append_log_preserves_positions() {
        let dir = tempfile::tempdir().unwrap();
        let store = MirrorStore::create(dir.path().to_path_buf()).unwrap();

        let n = store
            .append_log(&[
                PackageRecord::success(id("elm/core@1.0.5")),
                PackageRecord::failed(id("elm/html@1.0.0"), "HTTP 404"),
            ])
            .unwrap();
        assert_eq!(n, 2);

        let n = store
            .append_log(&[PackageRecord::success(id("elm/html@1.0.0"))])
            .unwrap();
        assert_eq!(n, 3);

        let log = store.load_log().unwrap();
        let ids: Vec<String> = log.records().iter().map(|r| r.identity().to_string()).collect();
        assert_eq!(ids, ["elm/core@1.0.5", "elm/html@1.0.0", "elm/html@1.0.0"]);
        assert_eq!(log.get(1).unwrap().error(), Some("HTTP 404"));
    }

    #[test]
    fn empty_append_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = MirrorStore::create(dir.path().to_path_buf()).unwrap();
        store
            .append_log(&[PackageRecord::success(id("elm/core@1.0.5"))])
            .unwrap();
        let before = std::fs::read(store.log_path()).unwrap();

        assert_eq!(store.append_log(&[]).unwrap(), 1);
        assert_eq!(std::fs::read(store.log_path()).unwrap(), before);

        // No log file is created for an empty append either.
        let empty = MirrorStore::create(dir.path().join("other")).unwrap();
        empty.append_log(&[]).unwrap();
        assert!(!empty.log_path().exists());
    }

    #[test]
    fn corrupt_log_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = MirrorStore::create(dir.path().to_path_buf()).unwrap();
        std::fs::write(store.log_path(), b"{\"packages\": [").unwrap();
        assert!(matches!(store.load_log(), Err(RegistryError::CorruptLog { .. })));
    }

    #[test]
    fn index_can_be_deleted_and_rebuilt_identically() {
        let dir = tempfile::tempdir().unwrap();
        let store = MirrorStore::create(dir.path().to_path_buf()).unwrap();
        store
            .append_log(&[
                PackageRecord::success(id("elm/core@1.0.5")),
                PackageRecord::failed(id("elm/html@1.0.0"), "HTTP 503"),
            ])
            .unwrap();
        let universe = [id("elm/core@1.0.4"), id("elm/core@1.0.5"), id("elm/json@1.1.3")];

        let log = store.load_log().unwrap();
        store.write_index(&VersionIndex::rebuild(&log, &universe)).unwrap();
        let original = std::fs::read(store.index_path()).unwrap();

        std::fs::remove_file(store.index_path()).unwrap();
        assert!(store.load_index().unwrap().is_none());

        let log = store.load_log().unwrap();
        store.write_index(&VersionIndex::rebuild(&log, &universe)).unwrap();
        assert_eq!(std::fs::read(store.index_path()).unwrap(), original);
    }

    #[test]
    fn invalid_integrity_record_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = MirrorStore::create(dir.path().to_path_buf()).unwrap();
        let core = id("elm/core@1.0.5");
        store
            .write_artifact(&core, Artifact::Integrity, br#"{"algorithm":"sha1","hash":"abc"}"#)
            .unwrap();
        assert!(matches!(
            store.read_integrity(&core),
            Err(RegistryError::InvalidIntegrity { .. })
        ));
    }

    #[test]
    fn scan_versions_reports_manifest_and_docs() {
        let dir = tempfile::tempdir().unwrap();
        let store = MirrorStore::create(dir.path().to_path_buf()).unwrap();
        let core = id("elm/core@1.0.5");
        let json = id("elm/json@1.1.3");
        store_complete(&store, &core, b"a");
        store.write_artifact(&core, Artifact::Docs, b"[]").unwrap();
        store_complete(&store, &json, b"b");
        std::fs::create_dir_all(store.packages_dir().join("elm/json/.partial")).unwrap();

        let versions = store.scan_versions().unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].identity, core);
        assert!(versions[0].has_docs);
        assert_eq!(versions[1].identity, json);
        assert!(versions[1].has_manifest);
        assert!(!versions[1].has_docs);

        assert_eq!(store.scan_packages().unwrap().len(), 2);
    }

    #[test]
    fn atomic_write_leaves_no_temporaries() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/file.json");
        write_atomic(&target, b"one").unwrap();
        write_atomic(&target, b"two").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"two");
        let entries = std::fs::read_dir(dir.path().join("nested")).unwrap().count();
        assert_eq!(entries, 1);
    }
}
