//! Content digests and integrity records.
//!
//! Every mirrored archive carries a `hash.json` integrity record naming the
//! digest algorithm and the hex digest of `package.zip` at the time it was
//! written. Elm clients expect SHA-1, which is what the sync process records;
//! SHA-256 records are accepted so that archives imported by other tools can
//! still be verified.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use sha2::Sha256;

/// A hex-encoded content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl ContentHash {
    /// Compute the SHA-1 digest of the given data.
    pub fn compute(data: &[u8]) -> Self {
        DigestAlgorithm::Sha1.digest(data)
    }

    /// Wrap an externally supplied hex digest, normalizing case.
    pub fn from_hex(hex: &str) -> Self {
        ContentHash(hex.trim().to_ascii_lowercase())
    }

    /// Get the hex string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify that the given data matches this hash under SHA-1.
    pub fn verify(&self, data: &[u8]) -> bool {
        ContentHash::compute(data) == *self
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Digest algorithms an integrity record may name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

impl DigestAlgorithm {
    /// Digest `data` with this algorithm.
    pub fn digest(self, data: &[u8]) -> ContentHash {
        match self {
            DigestAlgorithm::Sha1 => ContentHash(hex_encode(&Sha1::digest(data))),
            DigestAlgorithm::Sha256 => ContentHash(hex_encode(&Sha256::digest(data))),
        }
    }

    /// Length of a hex digest produced by this algorithm.
    pub fn hex_len(self) -> usize {
        match self {
            DigestAlgorithm::Sha1 => 40,
            DigestAlgorithm::Sha256 => 64,
        }
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DigestAlgorithm::Sha1 => write!(f, "sha1"),
            DigestAlgorithm::Sha256 => write!(f, "sha256"),
        }
    }
}

/// Encode bytes as lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// The contents of `hash.json` for one mirrored release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntegrityRecord {
    /// Algorithm used to produce `hash`.
    pub algorithm: DigestAlgorithm,
    /// Hex digest of `package.zip`.
    pub hash: ContentHash,
}

impl IntegrityRecord {
    /// Record the SHA-1 digest of an archive.
    pub fn for_archive(archive: &[u8]) -> Self {
        IntegrityRecord {
            algorithm: DigestAlgorithm::Sha1,
            hash: ContentHash::compute(archive),
        }
    }

    /// Recompute the digest of `archive` with this record's algorithm.
    pub fn actual(&self, archive: &[u8]) -> ContentHash {
        self.algorithm.digest(archive)
    }

    /// Verify the archive bytes match the recorded digest.
    pub fn verify(&self, archive: &[u8]) -> bool {
        self.actual(archive) == self.hash
    }

    /// Check that the digest is well-formed hex of the right length.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let hex = self.hash.as_str();
        if hex.len() != self.algorithm.hex_len() {
            return Err(format!(
                "{} digest must be {} hex characters, got {}",
                self.algorithm,
                self.algorithm.hex_len(),
                hex.len()
            ));
        }
        if !hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err("digest is not lowercase hex".to_string());
        }
        Ok(())
    }
}
