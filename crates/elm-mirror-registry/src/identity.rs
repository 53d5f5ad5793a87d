//! Package identities.
//!
//! A [`PackageIdentity`] names one immutable release as `author/name@version`.
//! A [`PackageName`] is the `author/name` half, used as the version index key.
//!
//! Every segment doubles as a directory name under `packages/`, so segments
//! are restricted to ASCII letters, digits, `-`, `_` and `.`, and may not
//! start with `.`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};

/// An `author/name` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageName {
    author: String,
    name: String,
}

impl PackageName {
    /// Create a package name, validating both segments.
    pub fn new(author: &str, name: &str) -> Result<Self> {
        let input = format!("{author}/{name}");
        validate_segment(&input, "author", author)?;
        validate_segment(&input, "name", name)?;
        Ok(PackageName {
            author: author.to_string(),
            name: name.to_string(),
        })
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a version to form a full identity.
    pub fn at(&self, version: &str) -> Result<PackageIdentity> {
        validate_segment(&format!("{self}@{version}"), "version", version)?;
        Ok(PackageIdentity {
            package: self.clone(),
            version: version.to_string(),
        })
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.author, self.name)
    }
}

impl FromStr for PackageName {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        let (author, name) = s.split_once('/').ok_or_else(|| RegistryError::InvalidIdentity {
            input: s.to_string(),
            detail: "expected 'author/name'".to_string(),
        })?;
        PackageName::new(author, name)
    }
}

impl TryFrom<String> for PackageName {
    type Error = RegistryError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<PackageName> for String {
    fn from(name: PackageName) -> String {
        name.to_string()
    }
}

/// The `(author, name, version)` triple naming one release.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageIdentity {
    package: PackageName,
    version: String,
}

impl PackageIdentity {
    /// Create an identity, validating every segment.
    pub fn new(author: &str, name: &str, version: &str) -> Result<Self> {
        PackageName::new(author, name)?.at(version)
    }

    pub fn author(&self) -> &str {
        self.package.author()
    }

    pub fn name(&self) -> &str {
        self.package.name()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// The `author/name` half of this identity.
    pub fn package(&self) -> &PackageName {
        &self.package
    }

    /// Directory of this release relative to `packages/`.
    pub fn relative_dir(&self) -> PathBuf {
        PathBuf::from(self.author())
            .join(self.name())
            .join(&self.version)
    }

    /// URL path of this release, e.g. `/packages/elm/core/1.0.5`.
    pub fn url_path(&self) -> String {
        format!("/packages/{}/{}/{}", self.author(), self.name(), self.version)
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.package, self.version)
    }
}

impl FromStr for PackageIdentity {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        let (package, version) = s.split_once('@').ok_or_else(|| RegistryError::InvalidIdentity {
            input: s.to_string(),
            detail: "expected 'author/name@version'".to_string(),
        })?;
        package.parse::<PackageName>()?.at(version)
    }
}

impl TryFrom<String> for PackageIdentity {
    type Error = RegistryError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<PackageIdentity> for String {
    fn from(id: PackageIdentity) -> String {
        id.to_string()
    }
}

fn validate_segment(input: &str, what: &str, segment: &str) -> Result<()> {
    let invalid = |detail: String| RegistryError::InvalidIdentity {
        input: input.to_string(),
        detail,
    };
    if segment.is_empty() {
        return Err(invalid(format!("{what} is empty")));
    }
    if segment.starts_with('.') {
        return Err(invalid(format!("{what} may not start with '.'")));
    }
    if let Some(c) = segment
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(invalid(format!("{what} contains '{c}'")));
    }
    Ok(())
}
