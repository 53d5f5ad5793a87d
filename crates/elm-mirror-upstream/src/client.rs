//! Upstream registry trait and HTTP implementation.
//!
//! The [`Upstream`] trait abstracts the package server so the orchestrator
//! can be driven by an in-memory fake in tests. [`HttpUpstream`] speaks the
//! Elm package server protocol:
//!
//! ```text
//! GET /all-packages                          {"author/name": ["1.0.0", ...]}
//! GET /packages/<a>/<n>/<v>/elm.json         manifest
//! GET /packages/<a>/<n>/<v>/endpoint.json    {"url": ..., "hash": <sha1>}
//! GET <url>                                  archive (usually on GitHub)
//! GET /packages/<a>/<n>/<v>/docs.json        API docs
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use elm_mirror_registry::{ContentHash, EndpointDescriptor, IntegrityRecord, PackageIdentity, PackageName};
use tracing::{debug, warn};

use crate::error::{Result, UpstreamError};
use crate::outcome::FetchOutcome;
use crate::rate_limit::RateLimiter;

/// The public Elm package server.
pub const DEFAULT_UPSTREAM: &str = "https://package.elm-lang.org";

/// An archive fetched from upstream together with its computed digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArchive {
    pub bytes: Vec<u8>,
    pub integrity: IntegrityRecord,
}

impl FetchedArchive {
    /// Wrap archive bytes, computing their digest.
    pub fn new(bytes: Vec<u8>) -> Self {
        let integrity = IntegrityRecord::for_archive(&bytes);
        FetchedArchive { bytes, integrity }
    }
}

/// Compute the digest Elm clients expect for an archive.
pub fn compute_digest(bytes: &[u8]) -> ContentHash {
    ContentHash::compute(bytes)
}

/// Abstract package server.
///
/// Every request waits for a slot from the caller's [`RateLimiter`].
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Every identity upstream knows about.
    async fn list_identities(&self, limiter: &RateLimiter) -> FetchOutcome<Vec<PackageIdentity>>;

    /// Raw `elm.json` bytes.
    async fn fetch_manifest(&self, identity: &PackageIdentity, limiter: &RateLimiter) -> FetchOutcome<Vec<u8>>;

    /// Archive bytes plus their digest.
    async fn fetch_archive(&self, identity: &PackageIdentity, limiter: &RateLimiter) -> FetchOutcome<FetchedArchive>;

    /// Raw `docs.json` bytes. `NotFound` is an expected outcome.
    async fn fetch_docs(&self, identity: &PackageIdentity, limiter: &RateLimiter) -> FetchOutcome<Vec<u8>>;
}

/// Connection settings for [`HttpUpstream`].
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Root URL of the package server.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        UpstreamConfig {
            base_url: DEFAULT_UPSTREAM.to_string(),
            timeout: Duration::from_secs(30),
            user_agent: format!("elm-mirror/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// reqwest-backed client for an Elm package server.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUpstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(UpstreamError::InvalidUrl {
                url: config.base_url.clone(),
                detail: "expected an http:// or https:// URL".to_string(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(HttpUpstream { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn package_url(&self, identity: &PackageIdentity, file: &str) -> String {
        format!("{}{}/{file}", self.base_url, identity.url_path())
    }

    /// GET a URL and classify the response.
    async fn get(&self, url: &str, limiter: &RateLimiter) -> FetchOutcome<Vec<u8>> {
        limiter.acquire().await;
        debug!(%url, "upstream GET");

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return FetchOutcome::transient(format!("timed out fetching {url}")),
            Err(e) => return FetchOutcome::transient(format!("request to {url} failed: {e}")),
        };

        let status = response.status();
        if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS {
            return FetchOutcome::transient(format!("HTTP {status} from {url}"));
        }
        if status.is_client_error() {
            return FetchOutcome::NotFound {
                status: status.as_u16(),
            };
        }
        if !status.is_success() {
            return FetchOutcome::transient(format!("HTTP {status} from {url}"));
        }
        match response.bytes().await {
            Ok(body) => FetchOutcome::Fetched(body.to_vec()),
            Err(e) => FetchOutcome::transient(format!("reading body of {url}: {e}")),
        }
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn list_identities(&self, limiter: &RateLimiter) -> FetchOutcome<Vec<PackageIdentity>> {
        let url = format!("{}/all-packages", self.base_url);
        let body = match self.get(&url, limiter).await {
            FetchOutcome::Fetched(body) => body,
            FetchOutcome::NotFound { status } => return FetchOutcome::NotFound { status },
            FetchOutcome::Transient { reason } => return FetchOutcome::Transient { reason },
        };

        let listing: BTreeMap<String, Vec<String>> = match serde_json::from_slice(&body) {
            Ok(listing) => listing,
            Err(e) => return FetchOutcome::transient(format!("invalid package listing: {e}")),
        };

        let mut identities = Vec::new();
        for (package, versions) in listing {
            let package: PackageName = match package.parse() {
                Ok(package) => package,
                Err(e) => {
                    warn!("ignoring upstream entry: {e}");
                    continue;
                }
            };
            for version in versions {
                match package.at(&version) {
                    Ok(identity) => identities.push(identity),
                    Err(e) => warn!("ignoring upstream entry: {e}"),
                }
            }
        }
        FetchOutcome::Fetched(identities)
    }

    async fn fetch_manifest(&self, identity: &PackageIdentity, limiter: &RateLimiter) -> FetchOutcome<Vec<u8>> {
        self.get(&self.package_url(identity, "elm.json"), limiter).await
    }

    async fn fetch_archive(&self, identity: &PackageIdentity, limiter: &RateLimiter) -> FetchOutcome<FetchedArchive> {
        let endpoint = match self.get(&self.package_url(identity, "endpoint.json"), limiter).await {
            FetchOutcome::Fetched(body) => body,
            FetchOutcome::NotFound { status } => return FetchOutcome::NotFound { status },
            FetchOutcome::Transient { reason } => return FetchOutcome::Transient { reason },
        };
        let endpoint: EndpointDescriptor = match serde_json::from_slice(&endpoint) {
            Ok(endpoint) => endpoint,
            Err(e) => return FetchOutcome::transient(format!("invalid endpoint.json for {identity}: {e}")),
        };

        self.get(&endpoint.url, limiter).await.and_then(|bytes| {
            let archive = FetchedArchive::new(bytes);
            let expected = ContentHash::from_hex(endpoint.hash.as_str());
            if archive.integrity.hash == expected {
                FetchOutcome::Fetched(archive)
            } else {
                FetchOutcome::transient(format!(
                    "hash mismatch for {identity}: expected {expected}, got {}",
                    archive.integrity.hash
                ))
            }
        })
    }

    async fn fetch_docs(&self, identity: &PackageIdentity, limiter: &RateLimiter) -> FetchOutcome<Vec<u8>> {
        self.get(&self.package_url(identity, "docs.json"), limiter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn id(s: &str) -> PackageIdentity {
        s.parse().unwrap()
    }

    fn upstream(server: &MockServer) -> HttpUpstream {
        HttpUpstream::new(&UpstreamConfig {
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
            ..UpstreamConfig::default()
        })
        .unwrap()
    }

    async fn mount_archive(server: &MockServer, identity: &str, archive: &[u8], hash: &str) {
        let (package, version) = identity.split_once('@').unwrap();
        let endpoint = serde_json::json!({
            "url": format!("{}/zipball/{package}/{version}", server.uri()),
            "hash": hash,
        });
        Mock::given(method("GET"))
            .and(path(format!("/packages/{package}/{version}/endpoint.json")))
            .respond_with(ResponseTemplate::new(200).set_body_json(endpoint))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/zipball/{package}/{version}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(archive.to_vec()))
            .mount(server)
            .await;
    }

    #[test]
    fn rejects_non_http_base_url() {
        let config = UpstreamConfig {
            base_url: "ftp://example.org".to_string(),
            ..UpstreamConfig::default()
        };
        assert!(matches!(HttpUpstream::new(&config), Err(UpstreamError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn list_identities_flattens_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/all-packages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "elm/core": ["1.0.0", "1.0.5"],
                "elm/json": ["1.1.3"],
                "bad entry": ["1.0.0"],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let limiter = RateLimiter::unlimited();
        let ids = upstream(&server).list_identities(&limiter).await.fetched().unwrap();
        let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
        assert_eq!(ids, ["elm/core@1.0.0", "elm/core@1.0.5", "elm/json@1.1.3"]);
        assert_eq!(limiter.granted(), 1);
    }

    #[tokio::test]
    async fn classifies_status_codes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/packages/elm/core/1.0.5/elm.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"name\":\"elm/core\"}"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/packages/elm/html/9.9.9/elm.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/packages/elm/json/1.1.3/elm.json"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/packages/elm/url/1.0.0/elm.json"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/packages/elm/time/1.0.0/elm.json"))
            .respond_with(ResponseTemplate::new(408))
            .mount(&server)
            .await;

        let client = upstream(&server);
        let limiter = RateLimiter::unlimited();
        assert_eq!(
            client.fetch_manifest(&id("elm/core@1.0.5"), &limiter).await,
            FetchOutcome::Fetched(b"{\"name\":\"elm/core\"}".to_vec())
        );
        assert_eq!(
            client.fetch_manifest(&id("elm/html@9.9.9"), &limiter).await,
            FetchOutcome::NotFound { status: 404 }
        );
        assert!(client
            .fetch_manifest(&id("elm/json@1.1.3"), &limiter)
            .await
            .is_transient());
        // Throttling and server-side timeouts are worth retrying.
        for throttled in ["elm/url@1.0.0", "elm/time@1.0.0"] {
            assert!(client.fetch_manifest(&id(throttled), &limiter).await.is_transient());
        }
    }

    #[tokio::test]
    async fn timeouts_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/packages/elm/core/1.0.5/docs.json"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let client = HttpUpstream::new(&UpstreamConfig {
            base_url: server.uri(),
            timeout: Duration::from_millis(200),
            ..UpstreamConfig::default()
        })
        .unwrap();
        let outcome = client
            .fetch_docs(&id("elm/core@1.0.5"), &RateLimiter::unlimited())
            .await;
        assert!(outcome.is_transient());
    }

    #[tokio::test]
    async fn archive_digest_checked_against_endpoint() {
        let server = MockServer::start().await;
        let archive = b"PK\x03\x04 zip bytes";
        let good = compute_digest(archive);
        mount_archive(&server, "elm/core@1.0.5", archive, &good.as_str().to_uppercase()).await;
        mount_archive(&server, "elm/json@1.1.3", archive, "0000000000000000000000000000000000000000").await;

        let client = upstream(&server);
        let limiter = RateLimiter::unlimited();

        let fetched = client
            .fetch_archive(&id("elm/core@1.0.5"), &limiter)
            .await
            .fetched()
            .unwrap();
        assert_eq!(fetched.bytes, archive);
        assert_eq!(fetched.integrity.hash, good);
        assert_eq!(limiter.granted(), 2);

        let mismatch = client.fetch_archive(&id("elm/json@1.1.3"), &limiter).await;
        match mismatch {
            FetchOutcome::Transient { reason } => assert!(reason.contains("hash mismatch")),
            other => panic!("expected transient, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_endpoint_is_not_found() {
        let server = MockServer::start().await;
        let outcome = upstream(&server)
            .fetch_archive(&id("nobody/nothing@1.0.0"), &RateLimiter::unlimited())
            .await;
        assert_eq!(outcome, FetchOutcome::NotFound { status: 404 });
    }
}
