//! `elm-mirror serve`: serve the mirror over HTTP.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use elm_mirror_server::MirrorState;
use tokio::net::TcpListener;

use crate::commands::{cancellation, open_mirror};
use crate::config::MirrorConfig;

/// Serve until Ctrl-C.
pub async fn run(mirror: &Path, config: &MirrorConfig) -> Result<()> {
    let store = open_mirror(mirror)?;
    let addr = format!("{}:{}", config.serve.host, config.serve.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    let base_url = config.base_url();
    println!("Serving {} at {base_url}", mirror.display());
    let state = Arc::new(MirrorState::new(store, base_url));
    let shutdown = cancellation(None);
    elm_mirror_server::serve(listener, state, async move { shutdown.cancelled().await })
        .await
        .context("server failed")
}
