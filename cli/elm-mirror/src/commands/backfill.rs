//! `elm-mirror backfill-docs`: fetch docs for releases mirrored without them.

use std::path::Path;

use anyhow::{Context, Result};
use elm_mirror_sync::backfill_docs;
use elm_mirror_upstream::HttpUpstream;

use crate::commands::{cancellation, open_mirror};
use crate::config::MirrorConfig;

/// Returns whether every candidate got its docs.
pub async fn run(mirror: &Path, config: &MirrorConfig) -> Result<bool> {
    let store = open_mirror(mirror)?;
    let upstream = HttpUpstream::new(&config.upstream_config()).context("configuring upstream client")?;
    let cancel = cancellation(None);
    let report = backfill_docs(&store, &upstream, config.upstream.rate_limit, &cancel)
        .await
        .context("backfilling docs")?;

    println!(
        "Candidates: {} | Written: {} | Failed: {}",
        report.candidates,
        report.written.len(),
        report.failed.len()
    );
    for (identity, error) in &report.failed {
        println!("  FAILED {identity}: {error}");
    }
    if report.cancelled {
        println!("Backfill cancelled");
    }
    Ok(report.failed.is_empty() && !report.cancelled)
}
