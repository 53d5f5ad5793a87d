//! `elm-mirror verify`: re-check stored archives against their digests.

use std::path::Path;

use anyhow::{Context, Result};
use elm_mirror_verify::{verify_mirror, VerifyReport};

use crate::commands::{cancellation, open_mirror};

/// Verify the mirror. Returns whether every check passed.
pub async fn run(mirror: &Path) -> Result<bool> {
    let store = open_mirror(mirror)?;
    let cancel = cancellation(None);
    let report: VerifyReport = tokio::task::spawn_blocking(move || verify_mirror(&store, &cancel))
        .await
        .context("verification task panicked")?
        .context("verifying mirror")?;

    print!("{report}");
    Ok(report.passed())
}
