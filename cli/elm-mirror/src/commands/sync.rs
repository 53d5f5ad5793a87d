//! `elm-mirror sync`: bring the mirror up to date with upstream.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use elm_mirror_registry::MirrorStore;
use elm_mirror_sync::{DesiredSet, Orchestrator, SyncOptions, SyncOutcome, SyncReport};
use elm_mirror_upstream::{HttpUpstream, Upstream};
use tokio_util::sync::CancellationToken;

use crate::commands::{cancellation, create_mirror};
use crate::config::MirrorConfig;

/// Sync `mirror` against the configured upstream.
///
/// Without a package list, every release upstream lists is mirrored.
pub async fn run(
    mirror: &Path,
    config: &MirrorConfig,
    package_list: Option<&Path>,
    deadline: Option<Duration>,
) -> Result<SyncOutcome> {
    let store = create_mirror(mirror)?;
    let desired = match package_list {
        Some(path) => DesiredSet::from_list_file(path)?,
        None => DesiredSet::All,
    };
    let upstream = HttpUpstream::new(&config.upstream_config()).context("configuring upstream client")?;

    let report = sync_with(
        &store,
        &upstream,
        &desired,
        config.sync_options(),
        cancellation(deadline),
    )
    .await?;
    Ok(report.outcome())
}

/// Run one sync and print its summary.
pub async fn sync_with<U: Upstream + ?Sized>(
    store: &MirrorStore,
    upstream: &U,
    desired: &DesiredSet,
    options: SyncOptions,
    cancel: CancellationToken,
) -> Result<SyncReport> {
    let report = Orchestrator::new(store, upstream, options)
        .with_cancellation(cancel)
        .run(desired)
        .await
        .with_context(|| format!("syncing {}", store.root().display()))?;
    print_summary(&report);
    Ok(report)
}

fn print_summary(report: &SyncReport) {
    println!(
        "Desired: {} ({} already mirrored)",
        report.desired, report.already_synced
    );
    println!(
        "Synced: {} | Failed: {} | Not attempted: {} | Requests: {}",
        report.succeeded.len(),
        report.failed.len(),
        report.not_attempted,
        report.requests
    );
    for (identity, error) in &report.failed {
        println!("  FAILED {identity}: {error}");
    }
    match report.outcome() {
        SyncOutcome::Clean => println!("Sync complete"),
        SyncOutcome::PartialFailure => println!("Sync finished with failures; re-run to retry them"),
        SyncOutcome::Cancelled => println!("Sync cancelled; re-run to continue"),
    }
}
