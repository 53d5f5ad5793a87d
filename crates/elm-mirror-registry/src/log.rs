//! The append-only sync log (`registry.json`).
//!
//! Every sync attempt leaves one [`PackageRecord`]. Positions are zero-based
//! indices into the log and never change once written; later runs only
//! append. Failed records keep their positions, so a client paging with
//! `/all-packages/since/<n>` always sees the same tail for the same `n`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::identity::PackageIdentity;

/// Outcome of one sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Selected for the current run but not finished yet.
    Pending,
    /// All required artifacts were written and their digest recorded.
    Success,
    /// A required artifact could not be fetched or stored.
    Failed,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Pending => write!(f, "pending"),
            SyncStatus::Success => write!(f, "success"),
            SyncStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One entry of the sync log.
///
/// `error` is present exactly when the status is [`SyncStatus::Failed`];
/// the constructors and the deserializer both enforce this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RecordRepr", into = "RecordRepr")]
pub struct PackageRecord {
    identity: PackageIdentity,
    status: SyncStatus,
    error: Option<String>,
}

impl PackageRecord {
    /// A record for an identity that has entered the current run.
    pub fn pending(identity: PackageIdentity) -> Self {
        PackageRecord {
            identity,
            status: SyncStatus::Pending,
            error: None,
        }
    }

    pub fn success(identity: PackageIdentity) -> Self {
        PackageRecord {
            identity,
            status: SyncStatus::Success,
            error: None,
        }
    }

    pub fn failed(identity: PackageIdentity, error: impl Into<String>) -> Self {
        PackageRecord {
            identity,
            status: SyncStatus::Failed,
            error: Some(error.into()),
        }
    }

    /// Transition a pending record to success.
    pub fn mark_success(&mut self) {
        self.status = SyncStatus::Success;
        self.error = None;
    }

    /// Transition a pending record to failed.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = SyncStatus::Failed;
        self.error = Some(error.into());
    }

    pub fn identity(&self) -> &PackageIdentity {
        &self.identity
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Success
    }
}

/// On-disk shape of a record: flat author/name/version fields.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecordRepr {
    author: String,
    name: String,
    version: String,
    status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl TryFrom<RecordRepr> for PackageRecord {
    type Error = String;

    fn try_from(repr: RecordRepr) -> Result<Self, String> {
        let identity = PackageIdentity::new(&repr.author, &repr.name, &repr.version)
            .map_err(|e| e.to_string())?;
        match (repr.status, repr.error) {
            (SyncStatus::Failed, Some(error)) => Ok(PackageRecord::failed(identity, error)),
            (SyncStatus::Failed, None) => Err(format!("failed record for {identity} has no error")),
            (status, Some(_)) => Err(format!("{status} record for {identity} carries an error")),
            (status, None) => Ok(PackageRecord {
                identity,
                status,
                error: None,
            }),
        }
    }
}

impl From<PackageRecord> for RecordRepr {
    fn from(record: PackageRecord) -> Self {
        RecordRepr {
            author: record.identity.author().to_string(),
            name: record.identity.name().to_string(),
            version: record.identity.version().to_string(),
            status: record.status,
            error: record.error,
        }
    }
}

/// The full sync log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncLog {
    packages: Vec<PackageRecord>,
}

impl SyncLog {
    pub fn new() -> Self {
        SyncLog::default()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// All records in append order.
    pub fn records(&self) -> &[PackageRecord] {
        &self.packages
    }

    /// Record at a log position.
    pub fn get(&self, position: usize) -> Option<&PackageRecord> {
        self.packages.get(position)
    }

    /// Records at positions `from..len`, in append order. Empty past the end.
    pub fn since(&self, from: usize) -> &[PackageRecord] {
        self.packages.get(from..).unwrap_or(&[])
    }

    /// Identities with at least one success record.
    pub fn synced(&self) -> HashSet<&PackageIdentity> {
        self.packages
            .iter()
            .filter(|r| r.is_success())
            .map(|r| r.identity())
            .collect()
    }

    /// Whether an identity has a success record.
    pub fn is_synced(&self, identity: &PackageIdentity) -> bool {
        self.packages
            .iter()
            .any(|r| r.is_success() && r.identity() == identity)
    }

    /// Append records after every existing entry.
    pub fn append(&mut self, records: impl IntoIterator<Item = PackageRecord>) {
        self.packages.extend(records);
    }

    /// Serialize as pretty JSON with a trailing newline.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> PackageIdentity {
        s.parse().unwrap()
    }

    #[test]
    fn record_json_shape() {
        let ok = PackageRecord::success(id("elm/core@1.0.5"));
        assert_eq!(
            serde_json::to_string(&ok).unwrap(),
            r#"{"author":"elm","name":"core","version":"1.0.5","status":"success"}"#
        );

        let failed = PackageRecord::failed(id("elm/html@1.0.0"), "HTTP 404");
        assert_eq!(
            serde_json::to_string(&failed).unwrap(),
            r#"{"author":"elm","name":"html","version":"1.0.0","status":"failed","error":"HTTP 404"}"#
        );
    }

    #[test]
    fn reject_inconsistent_records() {
        let no_error = r#"{"author":"elm","name":"core","version":"1.0.5","status":"failed"}"#;
        assert!(serde_json::from_str::<PackageRecord>(no_error).is_err());

        let stray_error =
            r#"{"author":"elm","name":"core","version":"1.0.5","status":"success","error":"x"}"#;
        assert!(serde_json::from_str::<PackageRecord>(stray_error).is_err());

        let bad_identity = r#"{"author":"..","name":"core","version":"1.0.5","status":"success"}"#;
        assert!(serde_json::from_str::<PackageRecord>(bad_identity).is_err());
    }

    #[test]
    fn pending_transitions() {
        let mut record = PackageRecord::pending(id("elm/core@1.0.5"));
        assert_eq!(record.status(), SyncStatus::Pending);
        record.mark_failed("timeout");
        assert_eq!(record.error(), Some("timeout"));
        record.mark_success();
        assert!(record.is_success());
        assert_eq!(record.error(), None);
    }

    #[test]
    fn since_returns_tail_in_order() {
        let mut log = SyncLog::new();
        log.append((0..10).map(|i| PackageRecord::success(id(&format!("a/p{i}@1.0.0")))));

        let tail = log.since(8);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].identity().to_string(), "a/p8@1.0.0");
        assert_eq!(tail[1].identity().to_string(), "a/p9@1.0.0");
        assert!(log.since(10).is_empty());
        assert!(log.since(99).is_empty());
        assert_eq!(log.since(0).len(), 10);
    }

    #[test]
    fn synced_ignores_failed_and_pending() {
        let mut log = SyncLog::new();
        log.append([
            PackageRecord::success(id("elm/core@1.0.5")),
            PackageRecord::failed(id("elm/html@1.0.0"), "HTTP 404"),
            PackageRecord::pending(id("elm/json@1.1.3")),
        ]);
        let synced = log.synced();
        assert_eq!(synced.len(), 1);
        assert!(log.is_synced(&id("elm/core@1.0.5")));
        assert!(!log.is_synced(&id("elm/html@1.0.0")));
        assert!(!log.is_synced(&id("elm/json@1.1.3")));
    }

    #[test]
    fn bytes_round_trip_preserves_order() {
        let mut log = SyncLog::new();
        log.append([
            PackageRecord::success(id("elm/json@1.1.3")),
            PackageRecord::failed(id("elm/html@1.0.0"), "HTTP 404"),
            PackageRecord::success(id("elm/core@1.0.5")),
        ]);
        let bytes = log.to_bytes().unwrap();
        assert!(bytes.ends_with(b"}\n"));
        assert_eq!(SyncLog::from_bytes(&bytes).unwrap(), log);
    }
}
