//! Verification report and per-release findings.

use std::fmt;

use elm_mirror_registry::{Artifact, ContentHash, PackageIdentity};

/// What is wrong with one mirrored release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    /// The archive no longer matches its recorded digest.
    HashMismatch {
        expected: ContentHash,
        actual: ContentHash,
    },
    /// A required artifact is absent.
    MissingArtifact(Artifact),
    /// `hash.json` exists but cannot be parsed or names a bad digest.
    UnreadableIntegrity(String),
    /// An artifact exists but could not be read.
    UnreadableArtifact { artifact: Artifact, detail: String },
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Problem::HashMismatch { expected, actual } => {
                write!(f, "hash mismatch (expected {expected}, got {actual})")
            }
            Problem::MissingArtifact(artifact) => write!(f, "missing {}", artifact.file_name()),
            Problem::UnreadableIntegrity(detail) => write!(f, "unreadable hash.json: {detail}"),
            Problem::UnreadableArtifact { artifact, detail } => {
                write!(f, "unreadable {}: {detail}", artifact.file_name())
            }
        }
    }
}

/// A problem attributed to a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub identity: PackageIdentity,
    pub problem: Problem,
}

/// Outcome of one verification walk.
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    /// Releases checked.
    pub checked: usize,
    pub findings: Vec<Finding>,
    /// The walk stopped before every release was checked.
    pub cancelled: bool,
}

impl VerifyReport {
    /// True iff the walk completed and found nothing wrong.
    pub fn passed(&self) -> bool {
        !self.cancelled && self.findings.is_empty()
    }

    /// Releases whose archive digest no longer matches.
    pub fn mismatched(&self) -> Vec<&PackageIdentity> {
        self.findings
            .iter()
            .filter(|f| matches!(f.problem, Problem::HashMismatch { .. }))
            .map(|f| &f.identity)
            .collect()
    }

    pub(crate) fn record(&mut self, identity: &PackageIdentity, problems: Vec<Problem>) {
        self.checked += 1;
        self.findings.extend(problems.into_iter().map(|problem| Finding {
            identity: identity.clone(),
            problem,
        }));
    }
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for finding in &self.findings {
            writeln!(f, "{}: {}", finding.identity, finding.problem)?;
        }
        if self.cancelled {
            writeln!(f, "Verification cancelled after {} releases", self.checked)?;
        } else if self.findings.is_empty() {
            writeln!(f, "All checks passed ({} releases)", self.checked)?;
        } else {
            writeln!(
                f,
                "{} problems found in {} releases checked",
                self.findings.len(),
                self.checked
            )?;
        }
        Ok(())
    }
}
