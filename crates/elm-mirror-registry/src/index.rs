//! The derived version index (`all-packages`).
//!
//! Maps `author/name` to every known version, whether or not it has been
//! mirrored. The index is a projection of the sync log plus the upstream
//! identity universe; it can be deleted and rebuilt at any time.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::identity::{PackageIdentity, PackageName};
use crate::log::SyncLog;

/// `author/name` → ordered versions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionIndex(BTreeMap<PackageName, Vec<String>>);

impl VersionIndex {
    pub fn new() -> Self {
        VersionIndex::default()
    }

    /// Rebuild the index from the log and an upstream identity universe.
    ///
    /// The result depends only on the set of identities, not on their order,
    /// so rebuilding from the same inputs always yields identical bytes.
    pub fn rebuild<'a>(
        log: &'a SyncLog,
        universe: impl IntoIterator<Item = &'a PackageIdentity>,
    ) -> Self {
        let mut grouped: BTreeMap<PackageName, BTreeSet<String>> = BTreeMap::new();
        let logged = log.records().iter().map(|r| r.identity());
        for identity in universe.into_iter().chain(logged) {
            grouped
                .entry(identity.package().clone())
                .or_default()
                .insert(identity.version().to_string());
        }

        let map = grouped
            .into_iter()
            .map(|(package, versions)| {
                let mut versions: Vec<String> = versions.into_iter().collect();
                versions.sort_by(|a, b| compare_versions(a, b));
                (package, versions)
            })
            .collect();
        VersionIndex(map)
    }

    /// Known versions of a package, oldest first.
    pub fn versions(&self, package: &PackageName) -> &[String] {
        self.0.get(package).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every identity in the index.
    pub fn identities(&self) -> Vec<PackageIdentity> {
        self.0
            .iter()
            .flat_map(|(package, versions)| versions.iter().filter_map(|v| package.at(v).ok()))
            .collect()
    }

    pub fn package_count(&self) -> usize {
        self.0.len()
    }

    pub fn version_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Order versions semantically; strings that are not semver sort after all
/// semver strings, lexically among themselves.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (semver::Version::parse(a), semver::Version::parse(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
