//! Routes of the package protocol.

use std::num::IntErrorKind;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use elm_mirror_registry::{Artifact, EndpointDescriptor, PackageIdentity};
use tower_http::trace::TraceLayer;

use crate::error::ServerError;
use crate::state::MirrorState;

const JSON: &str = "application/json";
const ZIP: &str = "application/zip";

/// Build the mirror's router.
pub fn router(state: Arc<MirrorState>) -> Router {
    Router::new()
        .route("/all-packages", get(all_packages))
        .route("/all-packages/since/{n}", get(since).post(since))
        .route("/packages/{author}/{name}/{version}/{file}", get(package_file))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `GET /all-packages`
async fn all_packages(State(state): State<Arc<MirrorState>>) -> Result<Response, ServerError> {
    let bytes = match tokio::fs::read(state.store().index_path()).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => b"{}".to_vec(),
        Err(e) => return Err(e.into()),
    };
    Ok(([(header::CONTENT_TYPE, JSON)], bytes).into_response())
}

/// `GET|POST /all-packages/since/{n}`: identities at log positions `n..`.
async fn since(
    State(state): State<Arc<MirrorState>>,
    Path(n): Path<String>,
) -> Result<Json<Vec<String>>, ServerError> {
    let from = match n.parse::<usize>() {
        Ok(from) => from,
        // Any position too large for usize is past the end of the log.
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => usize::MAX,
        Err(_) => return Err(ServerError::NotFound),
    };
    let log = state.log().await?;
    Ok(Json(
        log.since(from)
            .iter()
            .map(|record| record.identity().to_string())
            .collect(),
    ))
}

/// Files servable from a release directory.
#[derive(Debug, Clone, Copy)]
enum PackageFile {
    Manifest,
    Docs,
    Archive,
    Endpoint,
}

impl PackageFile {
    fn parse(file: &str) -> Option<Self> {
        match file {
            "elm.json" => Some(PackageFile::Manifest),
            "docs.json" => Some(PackageFile::Docs),
            "package.zip" => Some(PackageFile::Archive),
            "endpoint.json" => Some(PackageFile::Endpoint),
            _ => None,
        }
    }
}

/// `GET /packages/{author}/{name}/{version}/{file}`
async fn package_file(
    State(state): State<Arc<MirrorState>>,
    Path((author, name, version, file)): Path<(String, String, String, String)>,
) -> Result<Response, ServerError> {
    let identity = PackageIdentity::new(&author, &name, &version).map_err(|_| ServerError::NotFound)?;
    let file = PackageFile::parse(&file).ok_or(ServerError::NotFound)?;

    if !state.log().await?.is_synced(&identity) {
        return Err(ServerError::NotMirrored(identity));
    }

    match file {
        PackageFile::Endpoint => {
            let lookup = identity.clone();
            let integrity = state
                .read(move |store| store.read_integrity(&lookup))
                .await?
                .ok_or(ServerError::NotFound)?;
            Ok(Json(EndpointDescriptor::for_mirror(state.base_url(), &identity, integrity.hash)).into_response())
        }
        PackageFile::Manifest => artifact(&state, &identity, Artifact::Manifest, JSON).await,
        PackageFile::Docs => artifact(&state, &identity, Artifact::Docs, JSON).await,
        PackageFile::Archive => artifact(&state, &identity, Artifact::Archive, ZIP).await,
    }
}

async fn artifact(
    state: &MirrorState,
    identity: &PackageIdentity,
    artifact: Artifact,
    content_type: &'static str,
) -> Result<Response, ServerError> {
    match tokio::fs::read(state.store().artifact_path(identity, artifact)).await {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ServerError::NotFound),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use elm_mirror_registry::{IntegrityRecord, MirrorStore, PackageRecord};
    use tower::ServiceExt;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: MirrorStore,
        app: Router,
    }

    fn id(s: &str) -> PackageIdentity {
        s.parse().unwrap()
    }

    /// A mirror with `elm/core@1.0.5` synced and `elm/html@9.9.9` failed.
    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = MirrorStore::create(dir.path().to_path_buf()).unwrap();
        let core = id("elm/core@1.0.5");
        store.write_artifact(&core, Artifact::Manifest, b"{\"name\":\"elm/core\"}").unwrap();
        store.write_artifact(&core, Artifact::Archive, b"core zip").unwrap();
        store
            .write_integrity(&core, &IntegrityRecord::for_archive(b"core zip"))
            .unwrap();
        store
            .append_log(&[
                PackageRecord::success(core),
                PackageRecord::failed(id("elm/html@9.9.9"), "HTTP 404"),
            ])
            .unwrap();
        let app = router(Arc::new(MirrorState::new(store.clone(), "http://mirror.test/")));
        Fixture { _dir: dir, store, app }
    }

    async fn request(app: &Router, method: Method, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .clone()
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
        request(app, Method::GET, uri).await
    }

    #[tokio::test]
    async fn all_packages_defaults_to_empty_object() {
        let f = fixture();
        assert_eq!(get(&f.app, "/all-packages").await, (StatusCode::OK, b"{}".to_vec()));

        std::fs::write(f.store.index_path(), br#"{"elm/core":["1.0.5"]}"#).unwrap();
        let (status, body) = get(&f.app, "/all-packages").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, br#"{"elm/core":["1.0.5"]}"#);
    }

    #[tokio::test]
    async fn since_lists_log_tail() {
        let f = fixture();
        let (status, body) = get(&f.app, "/all-packages/since/0").await;
        assert_eq!(status, StatusCode::OK);
        let listed: Vec<String> = serde_json::from_slice(&body).unwrap();
        assert_eq!(listed, ["elm/core@1.0.5", "elm/html@9.9.9"]);

        let (_, body) = request(&f.app, Method::POST, "/all-packages/since/1").await;
        let listed: Vec<String> = serde_json::from_slice(&body).unwrap();
        assert_eq!(listed, ["elm/html@9.9.9"]);

        assert_eq!(get(&f.app, "/all-packages/since/2").await, (StatusCode::OK, b"[]".to_vec()));
        assert_eq!(get(&f.app, "/all-packages/since/99").await, (StatusCode::OK, b"[]".to_vec()));
        assert_eq!(get(&f.app, "/all-packages/since/abc").await.0, StatusCode::NOT_FOUND);
        assert_eq!(
            get(&f.app, "/all-packages/since/99999999999999999999999999").await,
            (StatusCode::OK, b"[]".to_vec())
        );
    }

    #[tokio::test]
    async fn serves_mirrored_release() {
        let f = fixture();
        let (status, body) = get(&f.app, "/packages/elm/core/1.0.5/elm.json").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"{\"name\":\"elm/core\"}");

        let (status, body) = get(&f.app, "/packages/elm/core/1.0.5/package.zip").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"core zip");

        let (status, body) = get(&f.app, "/packages/elm/core/1.0.5/endpoint.json").await;
        assert_eq!(status, StatusCode::OK);
        let endpoint: EndpointDescriptor = serde_json::from_slice(&body).unwrap();
        assert_eq!(endpoint.url, "http://mirror.test/packages/elm/core/1.0.5/package.zip");
        assert_eq!(endpoint.hash, IntegrityRecord::for_archive(b"core zip").hash);
    }

    #[tokio::test]
    async fn unmirrored_releases_are_unavailable() {
        let f = fixture();
        for uri in [
            "/packages/elm/html/9.9.9/endpoint.json",
            "/packages/elm/never/1.0.0/elm.json",
        ] {
            assert_eq!(get(&f.app, uri).await.0, StatusCode::SERVICE_UNAVAILABLE, "{uri}");
        }
    }

    #[tokio::test]
    async fn malformed_or_missing_is_not_found() {
        let f = fixture();
        for uri in [
            "/packages/elm/core/1.0.5/README.md",
            "/packages/.hidden/core/1.0.5/elm.json",
            "/packages/elm/core/1.0.5/docs.json",
            "/nothing/here",
        ] {
            assert_eq!(get(&f.app, uri).await.0, StatusCode::NOT_FOUND, "{uri}");
        }
    }

    async fn since_tail(app: &Router, n: usize) -> Vec<String> {
        let (status, body) = get(app, &format!("/all-packages/since/{n}")).await;
        assert_eq!(status, StatusCode::OK);
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn since_positions_are_stable_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let store = MirrorStore::create(dir.path().to_path_buf()).unwrap();
        let records: Vec<PackageRecord> = (0..10)
            .map(|i| PackageRecord::success(id(&format!("a/p{i}@1.0.0"))))
            .collect();
        store.append_log(&records).unwrap();

        let app = router(Arc::new(MirrorState::new(store.clone(), "http://mirror.test")));
        assert_eq!(since_tail(&app, 8).await, ["a/p8@1.0.0", "a/p9@1.0.0"]);

        let restarted = router(Arc::new(MirrorState::new(store.clone(), "http://mirror.test")));
        assert_eq!(since_tail(&restarted, 8).await, ["a/p8@1.0.0", "a/p9@1.0.0"]);
        assert_eq!(since_tail(&restarted, 10).await, Vec::<String>::new());

        store
            .append_log(&[PackageRecord::failed(id("a/p10@1.0.0"), "HTTP 404")])
            .unwrap();
        assert_eq!(since_tail(&app, 8).await, ["a/p8@1.0.0", "a/p9@1.0.0", "a/p10@1.0.0"]);
        assert_eq!(since_tail(&restarted, 10).await, ["a/p10@1.0.0"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn serves_while_the_log_grows() {
        let f = fixture();
        let writer = {
            let store = f.store.clone();
            std::thread::spawn(move || {
                for i in 0..100 {
                    store
                        .append_log(&[PackageRecord::failed(id(&format!("a/p{i}@1.0.0")), "HTTP 404")])
                        .unwrap();
                }
            })
        };

        let mut last_len = 0;
        while !writer.is_finished() {
            let listed = since_tail(&f.app, 0).await;
            assert!(listed.len() >= last_len);
            last_len = listed.len();
            assert_eq!(get(&f.app, "/packages/elm/core/1.0.5/elm.json").await.0, StatusCode::OK);
        }
        writer.join().unwrap();
        assert_eq!(since_tail(&f.app, 0).await.len(), 102);
    }
}
