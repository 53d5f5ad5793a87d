//! The endpoint descriptor of the Elm package protocol.
//!
//! `endpoint.json` tells a client where to download a release's archive and
//! which SHA-1 digest to expect. Upstream points at GitHub; the mirror points
//! at its own `package.zip` route.

use serde::{Deserialize, Serialize};

use crate::identity::PackageIdentity;
use crate::integrity::ContentHash;

/// `{url, hash}` payload of `endpoint.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub url: String,
    pub hash: ContentHash,
}

impl EndpointDescriptor {
    /// Descriptor pointing at the mirror's own copy of an archive.
    ///
    /// `base_url` is the externally reachable root of the mirror; a trailing
    /// slash is ignored.
    pub fn for_mirror(base_url: &str, identity: &PackageIdentity, hash: ContentHash) -> Self {
        EndpointDescriptor {
            url: format!("{}{}/package.zip", base_url.trim_end_matches('/'), identity.url_path()),
            hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_url_is_absolute() {
        let id: PackageIdentity = "elm/core@1.0.5".parse().unwrap();
        let hash = ContentHash::compute(b"zip");
        for base in ["http://localhost:8000", "http://localhost:8000/"] {
            let endpoint = EndpointDescriptor::for_mirror(base, &id, hash.clone());
            assert_eq!(endpoint.url, "http://localhost:8000/packages/elm/core/1.0.5/package.zip");
            assert_eq!(endpoint.hash, hash);
        }
    }

    #[test]
    fn parses_upstream_payload() {
        let json = r#"{"url":"https://github.com/elm/core/zipball/1.0.5/","hash":"d2f5d2b0a4e4b2b1f1c3b0c9a5a4a3a2a1a0a9a8"}"#;
        let endpoint: EndpointDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(endpoint.url, "https://github.com/elm/core/zipball/1.0.5/");
        assert_eq!(endpoint.hash.as_str().len(), 40);
    }
}
