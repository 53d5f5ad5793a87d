//! Fetch `docs.json` for releases mirrored without it.
//!
//! Works from the package directories alone: any version directory with an
//! `elm.json` but no `docs.json` is a candidate. The sync log and version
//! index are never read or written.

use elm_mirror_registry::{Artifact, MirrorStore, PackageIdentity};
use elm_mirror_upstream::{RateLimiter, Upstream};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::Result;

/// Summary of one backfill pass.
#[derive(Debug, Clone, Default)]
pub struct BackfillReport {
    /// Versions that had a manifest but no docs.
    pub candidates: usize,
    pub written: Vec<PackageIdentity>,
    pub failed: Vec<(PackageIdentity, String)>,
    pub cancelled: bool,
}

/// Fill in missing docs under a fresh rate limiter.
pub async fn backfill_docs<U: Upstream + ?Sized>(
    store: &MirrorStore,
    upstream: &U,
    requests_per_hour: u32,
    cancel: &CancellationToken,
) -> Result<BackfillReport> {
    let limiter = RateLimiter::per_hour(requests_per_hour);
    let candidates: Vec<PackageIdentity> = store
        .scan_versions()?
        .into_iter()
        .filter(|v| v.has_manifest && !v.has_docs)
        .map(|v| v.identity)
        .collect();

    let mut report = BackfillReport {
        candidates: candidates.len(),
        ..BackfillReport::default()
    };
    info!("Found {} versions without docs.json", candidates.len());

    for identity in candidates {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                report.cancelled = true;
                break;
            }
            outcome = upstream.fetch_docs(&identity, &limiter) => outcome,
        };
        match outcome.into_result() {
            Ok(docs) => {
                store.write_artifact(&identity, Artifact::Docs, &docs)?;
                info!("{identity}: docs.json written");
                report.written.push(identity);
            }
            Err(failure) => {
                warn!("{identity}: docs.json: {failure}");
                report.failed.push((identity, failure.to_string()));
            }
        }
    }
    Ok(report)
}
