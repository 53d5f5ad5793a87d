//! `elm-mirror.toml` parsing and effective settings.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use elm_mirror_bundle::DEFAULT_MAX_BUNDLE_BYTES;
use elm_mirror_sync::SyncOptions;
use elm_mirror_upstream::{UpstreamConfig, DEFAULT_UPSTREAM};
use serde::Deserialize;

/// File name looked up in the mirror directory.
pub const CONFIG_FILE: &str = "elm-mirror.toml";

/// Settings for every command. Missing sections and keys take defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MirrorConfig {
    pub upstream: UpstreamSection,
    pub sync: SyncSection,
    pub serve: ServeSection,
    pub bundle: BundleSection,
}

/// `[upstream]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamSection {
    pub url: String,
    /// Requests per hour, 0 for unlimited.
    pub rate_limit: u32,
    pub timeout_secs: u64,
}

impl Default for UpstreamSection {
    fn default() -> Self {
        UpstreamSection {
            url: DEFAULT_UPSTREAM.to_string(),
            rate_limit: 10_000,
            timeout_secs: 30,
        }
    }
}

/// `[sync]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSection {
    pub concurrency: usize,
    pub retries: u32,
    pub retry_backoff_secs: u64,
    pub checkpoint_every: usize,
}

impl Default for SyncSection {
    fn default() -> Self {
        let defaults = SyncOptions::default();
        SyncSection {
            concurrency: defaults.concurrency,
            retries: defaults.retries,
            retry_backoff_secs: defaults.retry_backoff.as_secs(),
            checkpoint_every: defaults.checkpoint_every,
        }
    }
}

/// `[serve]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServeSection {
    pub host: String,
    pub port: u16,
    /// External root of the mirror; defaults to `http://host:port`.
    pub base_url: Option<String>,
}

impl Default for ServeSection {
    fn default() -> Self {
        ServeSection {
            host: "127.0.0.1".to_string(),
            port: 8000,
            base_url: None,
        }
    }
}

/// `[bundle]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BundleSection {
    pub max_bytes: u64,
}

impl Default for BundleSection {
    fn default() -> Self {
        BundleSection {
            max_bytes: DEFAULT_MAX_BUNDLE_BYTES,
        }
    }
}

impl MirrorConfig {
    /// Load `explicit` if given, else `<mirror_dir>/elm-mirror.toml` if it
    /// exists, else defaults. An explicit file must exist.
    pub fn load(explicit: Option<&Path>, mirror_dir: &Path) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let candidate = mirror_dir.join(CONFIG_FILE);
                if !candidate.is_file() {
                    return Ok(MirrorConfig::default());
                }
                candidate
            }
        };
        let content =
            std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            requests_per_hour: self.upstream.rate_limit,
            concurrency: self.sync.concurrency.max(1),
            retries: self.sync.retries,
            retry_backoff: Duration::from_secs(self.sync.retry_backoff_secs),
            checkpoint_every: self.sync.checkpoint_every.max(1),
        }
    }

    pub fn upstream_config(&self) -> UpstreamConfig {
        UpstreamConfig {
            base_url: self.upstream.url.clone(),
            timeout: Duration::from_secs(self.upstream.timeout_secs),
            ..UpstreamConfig::default()
        }
    }

    /// The URL clients use to reach the mirror.
    pub fn base_url(&self) -> String {
        self.serve
            .base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.serve.host, self.serve.port))
    }
}
