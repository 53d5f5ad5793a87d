//! The set of releases a sync run should end up with.

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use elm_mirror_registry::{PackageIdentity, PackageName, RegistryError};

use crate::error::{Result, SyncError};

/// One entry of a package list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSelector {
    /// `author/name@version`
    Exact(PackageIdentity),
    /// `author/name`: every version upstream lists.
    AllVersions(PackageName),
}

impl FromStr for PackageSelector {
    type Err = RegistryError;

    fn from_str(s: &str) -> std::result::Result<Self, RegistryError> {
        if s.contains('@') {
            s.parse().map(PackageSelector::Exact)
        } else {
            s.parse().map(PackageSelector::AllVersions)
        }
    }
}

/// What a sync run should mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesiredSet {
    /// Every release upstream lists.
    All,
    /// An explicit package list.
    Selected(Vec<PackageSelector>),
}

impl DesiredSet {
    /// Read a JSON array of selectors, e.g. `["elm/core@1.0.5", "elm/json"]`.
    pub fn from_list_file(path: &Path) -> Result<Self> {
        let err = |detail: String| SyncError::PackageList {
            path: path.to_path_buf(),
            detail,
        };
        let bytes = std::fs::read(path).map_err(|e| err(e.to_string()))?;
        let entries: Vec<String> = serde_json::from_slice(&bytes).map_err(|e| err(e.to_string()))?;
        let selectors = entries
            .iter()
            .map(|entry| entry.parse())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e: RegistryError| err(e.to_string()))?;
        Ok(DesiredSet::Selected(selectors))
    }

    /// Whether resolving this set needs the upstream listing.
    pub fn needs_listing(&self) -> bool {
        match self {
            DesiredSet::All => true,
            DesiredSet::Selected(selectors) => selectors
                .iter()
                .any(|s| matches!(s, PackageSelector::AllVersions(_))),
        }
    }

    /// Expand into concrete identities, first occurrence order, no duplicates.
    ///
    /// `universe` must be provided when [`needs_listing`](Self::needs_listing)
    /// is true; otherwise it is ignored.
    pub fn resolve(&self, universe: Option<&[PackageIdentity]>) -> Vec<PackageIdentity> {
        let universe = universe.unwrap_or(&[]);
        let mut resolved = Resolved::default();

        match self {
            DesiredSet::All => universe.iter().for_each(|id| resolved.push(id)),
            DesiredSet::Selected(selectors) => {
                for selector in selectors {
                    match selector {
                        PackageSelector::Exact(identity) => resolved.push(identity),
                        PackageSelector::AllVersions(package) => {
                            let mut matched = false;
                            for identity in universe.iter().filter(|id| id.package() == package) {
                                resolved.push(identity);
                                matched = true;
                            }
                            if !matched {
                                tracing::warn!("no upstream versions found for {package}");
                            }
                        }
                    }
                }
            }
        }
        resolved.order
    }
}

#[derive(Default)]
struct Resolved {
    seen: HashSet<PackageIdentity>,
    order: Vec<PackageIdentity>,
}

impl Resolved {
    fn push(&mut self, identity: &PackageIdentity) {
        if self.seen.insert(identity.clone()) {
            self.order.push(identity.clone());
        }
    }
}
