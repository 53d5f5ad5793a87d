//! HTTP server for an Elm package mirror.
//!
//! Speaks the subset of the package protocol the Elm compiler uses:
//! the version index, the incremental `since` listing, and per-release
//! manifest, docs, archive and endpoint descriptor. The server only reads
//! the mirror; a sync may run alongside it.

pub mod error;
pub mod routes;
pub mod state;

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;

// Re-exports for convenience.
pub use error::ServerError;
pub use routes::router;
pub use state::MirrorState;

/// Serve the mirror on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: Arc<MirrorState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Serving mirror {} on http://{addr}", state.store().root().display());
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
