//! CLI command implementations.

pub mod backfill;
pub mod bundle;
pub mod reindex;
pub mod serve;
pub mod sync;
pub mod verify;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use elm_mirror_registry::MirrorStore;
use tokio_util::sync::CancellationToken;

/// A token cancelled by Ctrl-C or, if given, after `deadline`.
///
/// Must be called from within the tokio runtime.
pub fn cancellation(deadline: Option<Duration>) -> CancellationToken {
    let cancel = CancellationToken::new();

    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; finishing current work");
            on_signal.cancel();
        }
    });

    if let Some(deadline) = deadline {
        let on_deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            tracing::warn!("deadline of {}s reached; stopping", deadline.as_secs());
            on_deadline.cancel();
        });
    }

    cancel
}

/// Open an existing mirror directory.
pub fn open_mirror(mirror: &Path) -> Result<MirrorStore> {
    if !mirror.is_dir() {
        anyhow::bail!(
            "mirror directory not found: {}. Run 'elm-mirror sync' first.",
            mirror.display()
        );
    }
    Ok(MirrorStore::new(mirror.to_path_buf()))
}

/// Create the mirror directory skeleton if needed.
pub fn create_mirror(mirror: &Path) -> Result<MirrorStore> {
    MirrorStore::create(mirror.to_path_buf())
        .with_context(|| format!("creating mirror at {}", mirror.display()))
}
