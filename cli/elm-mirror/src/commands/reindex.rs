//! `elm-mirror reindex`: regenerate `all-packages` from the log and upstream.

use std::path::Path;

use anyhow::{Context, Result};
use elm_mirror_sync::Orchestrator;
use elm_mirror_upstream::HttpUpstream;

use crate::commands::{cancellation, open_mirror};
use crate::config::MirrorConfig;

pub async fn run(mirror: &Path, config: &MirrorConfig) -> Result<()> {
    let store = open_mirror(mirror)?;
    let upstream = HttpUpstream::new(&config.upstream_config()).context("configuring upstream client")?;
    let index = Orchestrator::new(&store, &upstream, config.sync_options())
        .with_cancellation(cancellation(None))
        .reindex()
        .await
        .context("rebuilding version index")?;
    println!(
        "Version index: {} packages, {} versions",
        index.package_count(),
        index.version_count()
    );
    Ok(())
}
