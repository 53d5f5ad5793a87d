//! Measuring packages and packing them into bundles.

use std::path::Path;

use elm_mirror_registry::{MirrorStore, PackageName};
use tracing::warn;

use crate::error::{BundleError, Result};

/// Default bundle cap: 2 GiB minus 100 MiB of headroom.
pub const DEFAULT_MAX_BUNDLE_BYTES: u64 = 2 * 1024 * 1024 * 1024 - 100 * 1024 * 1024;

/// On-disk size of one package directory, all versions included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSize {
    pub package: PackageName,
    pub bytes: u64,
}

/// Packages destined for one archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundle {
    /// Sorted alphabetically.
    pub packages: Vec<PackageName>,
    /// Uncompressed total.
    pub bytes: u64,
}

/// Measure every package directory in the mirror.
pub fn measure_packages(store: &MirrorStore) -> Result<Vec<PackageSize>> {
    store
        .scan_packages()?
        .into_iter()
        .map(|package| {
            let dir = store.packages_dir().join(package.author()).join(package.name());
            Ok(PackageSize {
                bytes: dir_size(&dir)?,
                package,
            })
        })
        .collect()
}

fn dir_size(dir: &Path) -> Result<u64> {
    let mut total = 0;
    let entries = std::fs::read_dir(dir).map_err(BundleError::io("reading", dir))?;
    for entry in entries {
        let entry = entry.map_err(BundleError::io("reading", dir))?;
        let path = entry.path();
        let meta = entry.metadata().map_err(BundleError::io("inspecting", &path))?;
        if meta.is_dir() {
            total += dir_size(&path)?;
        } else if meta.is_file() {
            total += meta.len();
        }
    }
    Ok(total)
}

/// Pack packages into bundles of at most `max_bytes` by first-fit decreasing.
///
/// A package larger than `max_bytes` gets a bundle of its own.
pub fn plan_bundles(sizes: &[PackageSize], max_bytes: u64) -> Vec<Bundle> {
    let mut by_size: Vec<&PackageSize> = sizes.iter().collect();
    by_size.sort_by(|a, b| b.bytes.cmp(&a.bytes));

    let mut bundles: Vec<Bundle> = Vec::new();
    for size in by_size {
        if size.bytes > max_bytes {
            warn!(
                "{} ({:.1} MiB) exceeds the bundle size limit; placing it in its own bundle",
                size.package,
                size.bytes as f64 / (1024.0 * 1024.0)
            );
            bundles.push(Bundle {
                packages: vec![size.package.clone()],
                bytes: size.bytes,
            });
            continue;
        }

        match bundles.iter_mut().find(|b| b.bytes + size.bytes <= max_bytes) {
            Some(bundle) => {
                bundle.packages.push(size.package.clone());
                bundle.bytes += size.bytes;
            }
            None => bundles.push(Bundle {
                packages: vec![size.package.clone()],
                bytes: size.bytes,
            }),
        }
    }

    for bundle in &mut bundles {
        bundle.packages.sort();
    }
    bundles
}
