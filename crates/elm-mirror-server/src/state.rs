//! Shared server state and the cached sync log snapshot.

use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use elm_mirror_registry::{MirrorStore, RegistryError, SyncLog};

use crate::error::ServerError;

/// Identifies one version of `registry.json` on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LogStamp {
    len: u64,
    modified: Option<SystemTime>,
}

#[derive(Debug)]
struct Snapshot {
    stamp: Option<LogStamp>,
    log: Arc<SyncLog>,
}

/// State shared by every request handler.
#[derive(Debug)]
pub struct MirrorState {
    store: MirrorStore,
    base_url: String,
    snapshot: RwLock<Option<Snapshot>>,
}

impl MirrorState {
    /// `base_url` is the externally reachable root used in `endpoint.json`.
    pub fn new(store: MirrorStore, base_url: impl Into<String>) -> Self {
        MirrorState {
            store,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            snapshot: RwLock::new(None),
        }
    }

    pub fn store(&self) -> &MirrorStore {
        &self.store
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The current sync log.
    ///
    /// Reloaded only when `registry.json` changes size or modification time.
    /// The log is replaced atomically, so a reload sees a complete file.
    pub async fn log(&self) -> Result<Arc<SyncLog>, ServerError> {
        let stamp = tokio::fs::metadata(self.store.log_path())
            .await
            .ok()
            .map(|meta| LogStamp {
                len: meta.len(),
                modified: meta.modified().ok(),
            });

        {
            let guard = self.snapshot.read().unwrap_or_else(|p| p.into_inner());
            if let Some(snapshot) = guard.as_ref() {
                if snapshot.stamp == stamp {
                    return Ok(snapshot.log.clone());
                }
            }
        }

        let log = Arc::new(self.read(|store| store.load_log()).await?);
        tracing::debug!("loaded sync log with {} records", log.len());
        let mut guard = self.snapshot.write().unwrap_or_else(|p| p.into_inner());
        *guard = Some(Snapshot {
            stamp,
            log: log.clone(),
        });
        Ok(log)
    }

    /// Run a store read on the blocking pool.
    pub(crate) async fn read<T, F>(&self, f: F) -> Result<T, ServerError>
    where
        T: Send + 'static,
        F: FnOnce(&MirrorStore) -> Result<T, RegistryError> + Send + 'static,
    {
        let store = self.store.clone();
        Ok(tokio::task::spawn_blocking(move || f(&store)).await??)
    }
}
