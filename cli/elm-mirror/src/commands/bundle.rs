//! `elm-mirror bundle`: split the mirror into `.tar.gz` bundles.

use std::path::Path;

use anyhow::{Context, Result};
use elm_mirror_bundle::{default_label, export};

use crate::commands::open_mirror;

pub fn run(mirror: &Path, output: &Path, label: Option<&str>, max_bytes: u64) -> Result<()> {
    let store = open_mirror(mirror)?;
    let label = label.map(str::to_string).unwrap_or_else(default_label);
    let bundles = export(&store, output, &label, max_bytes)
        .with_context(|| format!("exporting bundles to {}", output.display()))?;

    println!("Created archives:");
    for path in std::iter::once(&bundles.metadata).chain(&bundles.packages) {
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        println!("  {}: {:.2} MiB", path.display(), size as f64 / (1024.0 * 1024.0));
    }
    Ok(())
}
