//! In-memory upstream for development and testing.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use elm_mirror_registry::PackageIdentity;

use crate::client::{FetchedArchive, Upstream};
use crate::outcome::FetchOutcome;
use crate::rate_limit::RateLimiter;

/// One release held by a [`MemoryUpstream`].
#[derive(Debug, Clone)]
pub struct MemoryRelease {
    pub manifest: Vec<u8>,
    pub archive: Vec<u8>,
    pub docs: Option<Vec<u8>>,
}

/// An upstream whose releases live in memory.
///
/// Unknown identities answer 404. Listed-but-unfetchable identities and
/// transient failures can be injected to exercise failure paths.
#[derive(Debug, Default)]
pub struct MemoryUpstream {
    releases: Mutex<BTreeMap<PackageIdentity, MemoryRelease>>,
    listed_only: Mutex<Vec<PackageIdentity>>,
    flaky: Mutex<HashMap<PackageIdentity, u32>>,
    listing_failures: Mutex<u32>,
    requests: AtomicU64,
}

impl MemoryUpstream {
    pub fn new() -> Self {
        MemoryUpstream::default()
    }

    /// Add a fetchable release.
    pub fn publish(&self, identity: PackageIdentity, release: MemoryRelease) {
        lock(&self.releases).insert(identity, release);
    }

    /// Add a release with generated manifest, archive and docs.
    pub fn publish_simple(&self, identity: &PackageIdentity) {
        self.publish(
            identity.clone(),
            MemoryRelease {
                manifest: format!("{{\"name\":\"{}\",\"version\":\"{}\"}}", identity.package(), identity.version())
                    .into_bytes(),
                archive: format!("PK archive of {identity}").into_bytes(),
                docs: Some(b"[]".to_vec()),
            },
        );
    }

    /// List an identity in `all-packages` without making it fetchable.
    pub fn list_without_release(&self, identity: PackageIdentity) {
        lock(&self.listed_only).push(identity);
    }

    /// Make the next `times` manifest fetches of `identity` fail transiently.
    pub fn fail_transiently(&self, identity: &PackageIdentity, times: u32) {
        lock(&self.flaky).insert(identity.clone(), times);
    }

    /// Make the next `times` listing requests fail transiently.
    pub fn fail_listing(&self, times: u32) {
        *lock(&self.listing_failures) = times;
    }

    /// Number of requests served so far.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    async fn request(&self, limiter: &RateLimiter) {
        limiter.acquire().await;
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    fn release(&self, identity: &PackageIdentity) -> Option<MemoryRelease> {
        lock(&self.releases).get(identity).cloned()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Upstream for MemoryUpstream {
    async fn list_identities(&self, limiter: &RateLimiter) -> FetchOutcome<Vec<PackageIdentity>> {
        self.request(limiter).await;
        {
            let mut failures = lock(&self.listing_failures);
            if *failures > 0 {
                *failures -= 1;
                return FetchOutcome::transient("HTTP 503 Service Unavailable");
            }
        }
        let mut identities: Vec<PackageIdentity> = lock(&self.releases).keys().cloned().collect();
        identities.extend(lock(&self.listed_only).iter().cloned());
        identities.sort();
        FetchOutcome::Fetched(identities)
    }

    async fn fetch_manifest(&self, identity: &PackageIdentity, limiter: &RateLimiter) -> FetchOutcome<Vec<u8>> {
        self.request(limiter).await;
        {
            let mut flaky = lock(&self.flaky);
            if let Some(remaining) = flaky.get_mut(identity) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return FetchOutcome::transient("HTTP 502 Bad Gateway");
                }
            }
        }
        match self.release(identity) {
            Some(release) => FetchOutcome::Fetched(release.manifest),
            None => FetchOutcome::NotFound { status: 404 },
        }
    }

    async fn fetch_archive(&self, identity: &PackageIdentity, limiter: &RateLimiter) -> FetchOutcome<FetchedArchive> {
        self.request(limiter).await;
        match self.release(identity) {
            Some(release) => FetchOutcome::Fetched(FetchedArchive::new(release.archive)),
            None => FetchOutcome::NotFound { status: 404 },
        }
    }

    async fn fetch_docs(&self, identity: &PackageIdentity, limiter: &RateLimiter) -> FetchOutcome<Vec<u8>> {
        self.request(limiter).await;
        match self.release(identity).and_then(|r| r.docs) {
            Some(docs) => FetchOutcome::Fetched(docs),
            None => FetchOutcome::NotFound { status: 404 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_published_releases() {
        let upstream = MemoryUpstream::new();
        let core: PackageIdentity = "elm/core@1.0.5".parse().unwrap();
        let gone: PackageIdentity = "elm/gone@1.0.0".parse().unwrap();
        upstream.publish_simple(&core);
        upstream.list_without_release(gone.clone());
        let limiter = RateLimiter::unlimited();

        let listed = upstream.list_identities(&limiter).await.fetched().unwrap();
        assert_eq!(listed, vec![core.clone(), gone.clone()]);
        assert!(upstream.fetch_manifest(&core, &limiter).await.fetched().is_some());
        assert_eq!(
            upstream.fetch_archive(&gone, &limiter).await,
            FetchOutcome::NotFound { status: 404 }
        );
        assert_eq!(upstream.requests(), 3);
    }

    #[tokio::test]
    async fn injected_transient_failures_run_out() {
        let upstream = MemoryUpstream::new();
        let core: PackageIdentity = "elm/core@1.0.5".parse().unwrap();
        upstream.publish_simple(&core);
        upstream.fail_transiently(&core, 1);
        let limiter = RateLimiter::unlimited();

        assert!(upstream.fetch_manifest(&core, &limiter).await.is_transient());
        assert!(upstream.fetch_manifest(&core, &limiter).await.fetched().is_some());
    }
}
