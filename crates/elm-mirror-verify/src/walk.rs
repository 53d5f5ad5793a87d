//! The verification walk.

use std::collections::HashSet;

use elm_mirror_registry::{Artifact, MirrorStore, PackageIdentity};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Result;
use crate::report::{Problem, VerifyReport};

/// Check every successfully synced release, in log order.
///
/// The log is read once; records appended by a concurrent sync are picked up
/// by the next walk. Cancellation stops the walk between releases and yields
/// a report that does not pass.
pub fn verify_mirror(store: &MirrorStore, cancel: &CancellationToken) -> Result<VerifyReport> {
    let log = store.load_log()?;
    let mut report = VerifyReport::default();
    let mut seen = HashSet::new();

    for record in log.records().iter().filter(|r| r.is_success()) {
        let identity = record.identity();
        if !seen.insert(identity) {
            continue;
        }
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        let problems = check_release(store, identity);
        for problem in &problems {
            warn!("{identity}: {problem}");
        }
        report.record(identity, problems);
    }

    debug!(
        "verified {} releases, {} problems",
        report.checked,
        report.findings.len()
    );
    Ok(report)
}

/// Check one release's required artifacts and archive digest.
pub fn check_release(store: &MirrorStore, identity: &PackageIdentity) -> Vec<Problem> {
    let mut problems = Vec::new();

    if !store.has_artifact(identity, Artifact::Manifest) {
        problems.push(Problem::MissingArtifact(Artifact::Manifest));
    }

    let integrity = match store.read_integrity(identity) {
        Ok(Some(record)) => Some(record),
        Ok(None) => {
            problems.push(Problem::MissingArtifact(Artifact::Integrity));
            None
        }
        Err(e) => {
            problems.push(Problem::UnreadableIntegrity(e.to_string()));
            None
        }
    };

    let archive = match store.read_artifact(identity, Artifact::Archive) {
        Ok(Some(bytes)) => Some(bytes),
        Ok(None) => {
            problems.push(Problem::MissingArtifact(Artifact::Archive));
            None
        }
        Err(e) => {
            problems.push(Problem::UnreadableArtifact {
                artifact: Artifact::Archive,
                detail: e.to_string(),
            });
            None
        }
    };

    if let (Some(integrity), Some(archive)) = (integrity, archive) {
        let actual = integrity.actual(&archive);
        if actual != integrity.hash {
            problems.push(Problem::HashMismatch {
                expected: integrity.hash,
                actual,
            });
        }
    }

    problems
}
