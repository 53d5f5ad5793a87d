//! Incremental sync of the mirror against upstream.
//!
//! A run computes `delta = desired − already mirrored`, fetches each delta
//! release under one shared [`RateLimiter`], writes its artifacts, and
//! appends one record per attempted release to the sync log. Identities that
//! fail are recorded as failed and the run moves on; only local storage
//! failures abort it.
//!
//! Fetches may overlap (`concurrency > 1`) but results are consumed in delta
//! order by a single loop, which is the only writer of artifacts and the log.

use std::future::Future;
use std::time::Duration;

use elm_mirror_registry::{Artifact, MirrorStore, PackageIdentity, PackageRecord, VersionIndex};
use elm_mirror_upstream::{FetchOutcome, FetchedArchive, RateLimiter, Upstream};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::desired::DesiredSet;
use crate::error::{Result, SyncError};

/// Tunables for one sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Upstream request budget; 0 means unlimited.
    pub requests_per_hour: u32,
    /// Releases fetched at the same time.
    pub concurrency: usize,
    /// Extra attempts for a transient failure of a required fetch.
    pub retries: u32,
    /// Delay before retry `n` is `retry_backoff * n`.
    pub retry_backoff: Duration,
    /// Commit finished records to the log after this many releases.
    pub checkpoint_every: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncOptions {
            requests_per_hour: 10_000,
            concurrency: 1,
            retries: 2,
            retry_backoff: Duration::from_secs(5),
            checkpoint_every: 50,
        }
    }
}

/// How a run ended, for the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Every attempted release was mirrored.
    Clean,
    /// At least one release was recorded as failed.
    PartialFailure,
    /// The run stopped before the delta was exhausted.
    Cancelled,
}

/// Summary of one sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Distinct releases in the desired set.
    pub desired: usize,
    /// Desired releases skipped because they already have a success record.
    pub already_synced: usize,
    pub succeeded: Vec<PackageIdentity>,
    pub failed: Vec<(PackageIdentity, String)>,
    /// Delta releases left untouched because the run was cancelled.
    pub not_attempted: usize,
    pub cancelled: bool,
    /// Upstream requests issued.
    pub requests: u64,
    /// Length of the sync log after the run.
    pub log_len: usize,
}

impl SyncReport {
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn outcome(&self) -> SyncOutcome {
        if self.cancelled {
            SyncOutcome::Cancelled
        } else if !self.failed.is_empty() {
            SyncOutcome::PartialFailure
        } else {
            SyncOutcome::Clean
        }
    }
}

/// Result of fetching one release, before anything is written.
enum Fetched {
    Complete {
        identity: PackageIdentity,
        manifest: Vec<u8>,
        archive: FetchedArchive,
        docs: Option<Vec<u8>>,
    },
    Failed {
        identity: PackageIdentity,
        error: String,
    },
    Cancelled,
}

enum Step<T> {
    Done(FetchOutcome<T>),
    Cancelled,
}

/// Drives one sync run against a store and an upstream.
pub struct Orchestrator<'a, U: ?Sized> {
    store: &'a MirrorStore,
    upstream: &'a U,
    options: SyncOptions,
    cancel: CancellationToken,
}

impl<'a, U: Upstream + ?Sized> Orchestrator<'a, U> {
    pub fn new(store: &'a MirrorStore, upstream: &'a U, options: SyncOptions) -> Self {
        Orchestrator {
            store,
            upstream,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop the run cleanly when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sync the mirror towards `desired`.
    pub async fn run(&self, desired: &DesiredSet) -> Result<SyncReport> {
        let limiter = RateLimiter::per_hour(self.options.requests_per_hour);
        let log = self.store.load_log()?;
        let mut report = SyncReport {
            log_len: log.len(),
            ..SyncReport::default()
        };

        let universe = if desired.needs_listing() {
            match self.list_upstream(&limiter).await? {
                Some(universe) => Some(universe),
                None => {
                    report.cancelled = true;
                    report.requests = limiter.granted();
                    return Ok(report);
                }
            }
        } else {
            None
        };

        let wanted = desired.resolve(universe.as_deref());
        report.desired = wanted.len();
        let synced = log.synced();
        let delta: Vec<PackageIdentity> = wanted.into_iter().filter(|id| !synced.contains(id)).collect();
        report.already_synced = report.desired - delta.len();

        if delta.is_empty() {
            info!(
                "Found 0 new packages to sync ({} already mirrored)",
                report.already_synced
            );
            report.requests = limiter.granted();
            return Ok(report);
        }
        info!(
            "Found {} new packages to sync ({} already mirrored)",
            delta.len(),
            report.already_synced
        );

        self.process(&delta, &limiter, &mut report).await?;
        if report.attempted() > 0 {
            self.rebuild_index(universe, &limiter).await?;
        }

        report.requests = limiter.granted();
        info!(
            "Sync finished: {} succeeded, {} failed, {} not attempted",
            report.succeeded.len(),
            report.failed.len(),
            report.not_attempted
        );
        Ok(report)
    }

    /// Rebuild the version index from the log and a fresh upstream listing.
    pub async fn reindex(&self) -> Result<VersionIndex> {
        let limiter = RateLimiter::per_hour(self.options.requests_per_hour);
        let universe = self.list_upstream(&limiter).await?.ok_or_else(|| SyncError::Listing {
            detail: "cancelled".to_string(),
        })?;
        let log = self.store.load_log()?;
        let index = VersionIndex::rebuild(&log, &universe);
        self.store.write_index(&index)?;
        Ok(index)
    }

    /// Fetch the upstream listing; `None` if cancelled.
    async fn list_upstream(&self, limiter: &RateLimiter) -> Result<Option<Vec<PackageIdentity>>> {
        match self.retrying(|| self.upstream.list_identities(limiter)).await {
            Step::Cancelled => Ok(None),
            Step::Done(outcome) => outcome
                .into_result()
                .map(Some)
                .map_err(|failure| SyncError::Listing {
                    detail: failure.to_string(),
                }),
        }
    }

    async fn process(&self, delta: &[PackageIdentity], limiter: &RateLimiter, report: &mut SyncReport) -> Result<()> {
        let checkpoint_every = self.options.checkpoint_every.max(1);
        let mut uncommitted: Vec<PackageRecord> = Vec::new();
        let mut processed = 0;

        let mut fetches = stream::iter(delta)
            .map(|identity| self.fetch_one(identity, limiter))
            .buffered(self.options.concurrency.max(1));

        while let Some(fetched) = fetches.next().await {
            let record = match fetched {
                Fetched::Cancelled => {
                    report.cancelled = true;
                    break;
                }
                Fetched::Failed { identity, error } => {
                    warn!("{identity}: {error}");
                    let mut record = PackageRecord::pending(identity.clone());
                    record.mark_failed(error.clone());
                    report.failed.push((identity, error));
                    record
                }
                Fetched::Complete {
                    identity,
                    manifest,
                    archive,
                    docs,
                } => {
                    let mut record = PackageRecord::pending(identity.clone());
                    if let Err(e) = self.write_release(&identity, &manifest, &archive, docs.as_deref()) {
                        if let Err(commit_err) = self.commit(&mut uncommitted, report) {
                            warn!("could not commit finished records: {commit_err}");
                        }
                        return Err(e.into());
                    }
                    record.mark_success();
                    info!("{identity}: synced");
                    report.succeeded.push(identity);
                    record
                }
            };

            uncommitted.push(record);
            processed += 1;
            if uncommitted.len() >= checkpoint_every {
                self.commit(&mut uncommitted, report)?;
            }
        }
        drop(fetches);

        report.not_attempted = delta.len() - processed;
        self.commit(&mut uncommitted, report)
    }

    async fn fetch_one(&self, identity: &PackageIdentity, limiter: &RateLimiter) -> Fetched {
        if self.cancel.is_cancelled() {
            return Fetched::Cancelled;
        }
        debug!("{identity}: fetching");

        let manifest = match self.retrying(|| self.upstream.fetch_manifest(identity, limiter)).await {
            Step::Cancelled => return Fetched::Cancelled,
            Step::Done(outcome) => match outcome.into_result() {
                Ok(manifest) => manifest,
                Err(failure) => return Fetched::failed(identity, format!("elm.json: {failure}")),
            },
        };

        let archive = match self.retrying(|| self.upstream.fetch_archive(identity, limiter)).await {
            Step::Cancelled => return Fetched::Cancelled,
            Step::Done(outcome) => match outcome.into_result() {
                Ok(archive) => archive,
                Err(failure) => return Fetched::failed(identity, format!("package.zip: {failure}")),
            },
        };

        let docs = match self.once(self.upstream.fetch_docs(identity, limiter)).await {
            Step::Cancelled => return Fetched::Cancelled,
            Step::Done(FetchOutcome::Fetched(docs)) => Some(docs),
            Step::Done(FetchOutcome::NotFound { status }) => {
                debug!("{identity}: no docs.json upstream (HTTP {status})");
                None
            }
            Step::Done(FetchOutcome::Transient { reason }) => {
                warn!("{identity}: docs.json skipped: {reason}");
                None
            }
        };

        Fetched::Complete {
            identity: identity.clone(),
            manifest,
            archive,
            docs,
        }
    }

    /// Run a fetch, retrying transient outcomes with linear backoff.
    async fn retrying<T, F, Fut>(&self, mut op: F) -> Step<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FetchOutcome<T>>,
    {
        let mut attempt = 0;
        loop {
            let outcome = match self.once(op()).await {
                Step::Done(outcome) => outcome,
                Step::Cancelled => return Step::Cancelled,
            };
            match outcome {
                FetchOutcome::Transient { reason } if attempt < self.options.retries => {
                    attempt += 1;
                    debug!("transient upstream error ({reason}), retry {attempt}/{}", self.options.retries);
                    let delay = self.options.retry_backoff * attempt;
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Step::Cancelled,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                outcome => return Step::Done(outcome),
            }
        }
    }

    async fn once<T>(&self, fetch: impl Future<Output = FetchOutcome<T>>) -> Step<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Step::Cancelled,
            outcome = fetch => Step::Done(outcome),
        }
    }

    /// Write every artifact of a fetched release; the integrity record last.
    fn write_release(
        &self,
        identity: &PackageIdentity,
        manifest: &[u8],
        archive: &FetchedArchive,
        docs: Option<&[u8]>,
    ) -> elm_mirror_registry::Result<()> {
        self.store.write_artifact(identity, Artifact::Manifest, manifest)?;
        self.store.write_artifact(identity, Artifact::Archive, &archive.bytes)?;
        if let Some(docs) = docs {
            self.store.write_artifact(identity, Artifact::Docs, docs)?;
        }
        self.store.write_integrity(identity, &archive.integrity)
    }

    fn commit(&self, uncommitted: &mut Vec<PackageRecord>, report: &mut SyncReport) -> Result<()> {
        if uncommitted.is_empty() {
            return Ok(());
        }
        report.log_len = self.store.append_log(uncommitted)?;
        debug!("committed {} records, log length {}", uncommitted.len(), report.log_len);
        uncommitted.clear();
        Ok(())
    }

    async fn rebuild_index(&self, universe: Option<Vec<PackageIdentity>>, limiter: &RateLimiter) -> Result<()> {
        let universe = match universe {
            Some(universe) => universe,
            None => match self.once(self.upstream.list_identities(limiter)).await {
                Step::Done(FetchOutcome::Fetched(universe)) => universe,
                _ => {
                    warn!("upstream listing unavailable; rebuilding version index from the previous index");
                    match self.store.load_index() {
                        Ok(Some(index)) => index.identities(),
                        Ok(None) => Vec::new(),
                        Err(e) if e.is_storage() => return Err(e.into()),
                        Err(e) => {
                            warn!("previous version index unusable, rebuilding from the sync log alone: {e}");
                            Vec::new()
                        }
                    }
                }
            },
        };

        let log = self.store.load_log()?;
        let index = VersionIndex::rebuild(&log, &universe);
        self.store.write_index(&index)?;
        info!(
            "Version index: {} packages, {} versions",
            index.package_count(),
            index.version_count()
        );
        Ok(())
    }
}

impl Fetched {
    fn failed(identity: &PackageIdentity, error: String) -> Self {
        Fetched::Failed {
            identity: identity.clone(),
            error,
        }
    }
}
