//! Writing bundles as `.tar.gz` archives.
//!
//! Archive entries are rooted at `mirror/`, so unpacking every bundle of an
//! export into one directory reassembles the mirror.

use std::fs::File;
use std::path::{Path, PathBuf};

use elm_mirror_registry::store::{INDEX_FILE, LOG_FILE};
use elm_mirror_registry::{MirrorStore, PackageName};
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::Builder;
use tracing::info;

use crate::error::{BundleError, Result};
use crate::plan::{measure_packages, plan_bundles, Bundle};

/// Archives produced by one export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOutput {
    pub metadata: PathBuf,
    pub packages: Vec<PathBuf>,
}

/// Today's date as `YYYYMMDD`, the default bundle label.
pub fn default_label() -> String {
    chrono::Local::now().format("%Y%m%d").to_string()
}

/// Export the mirror as one metadata bundle and size-bounded package bundles.
pub fn export(store: &MirrorStore, out_dir: &Path, label: &str, max_bytes: u64) -> Result<BundleOutput> {
    std::fs::create_dir_all(out_dir).map_err(BundleError::io("creating", out_dir))?;

    let sizes = measure_packages(store)?;
    let total: u64 = sizes.iter().map(|s| s.bytes).sum();
    info!(
        "Found {} packages, {:.2} GiB",
        sizes.len(),
        total as f64 / (1024.0 * 1024.0 * 1024.0)
    );
    let bundles = plan_bundles(&sizes, max_bytes);

    let metadata = out_dir.join(format!("mirror-{label}-metadata.tar.gz"));
    write_metadata(store, &metadata)?;
    info!("Wrote {}", metadata.display());

    let mut packages = Vec::with_capacity(bundles.len());
    for (i, bundle) in bundles.iter().enumerate() {
        let path = out_dir.join(format!("mirror-{label}-packages-{}.tar.gz", i + 1));
        write_packages(store, bundle, &path)?;
        info!(
            "Wrote {} ({}/{}, {} packages)",
            path.display(),
            i + 1,
            bundles.len(),
            bundle.packages.len()
        );
        packages.push(path);
    }

    Ok(BundleOutput { metadata, packages })
}

fn write_metadata(store: &MirrorStore, path: &Path) -> Result<()> {
    write_archive(path, |builder| {
        for file in [INDEX_FILE, LOG_FILE] {
            let source = store.root().join(file);
            if source.is_file() {
                builder.append_path_with_name(&source, format!("mirror/{file}"))?;
            }
        }
        Ok(())
    })
}

fn write_packages(store: &MirrorStore, bundle: &Bundle, path: &Path) -> Result<()> {
    write_archive(path, |builder| {
        for package in &bundle.packages {
            builder.append_dir_all(entry_name(package), package_dir(store, package))?;
        }
        Ok(())
    })
}

fn write_archive(
    path: &Path,
    fill: impl FnOnce(&mut Builder<GzEncoder<File>>) -> std::io::Result<()>,
) -> Result<()> {
    let file = File::create(path).map_err(BundleError::io("creating", path))?;
    let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
    fill(&mut builder)
        .and_then(|_| builder.into_inner())
        .and_then(|encoder| encoder.finish())
        .and_then(|file| file.sync_all())
        .map_err(BundleError::io("writing", path))
}

fn package_dir(store: &MirrorStore, package: &PackageName) -> PathBuf {
    store.packages_dir().join(package.author()).join(package.name())
}

fn entry_name(package: &PackageName) -> String {
    format!("mirror/packages/{}/{}", package.author(), package.name())
}
