//! Registry and project manifest data model.

use crate::error::{Error, Result};
use crate::version::{parse_version, VersionRange};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Distribution info for one published version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dist {
    /// Tarball download URL.
    pub tarball: String,
    /// SHA-1 hex digest of the tarball.
    pub shasum: String,
}

/// Registry metadata for one published version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMeta {
    /// Runtime dependencies, name to range.
    #[serde(default)]
    pub dependencies: BTreeMap<String, VersionRange>,
    /// Distribution info.
    pub dist: Dist,
}

/// All published versions of one package, as served by the registry.
///
/// Versions enumerate in ascending precedence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManifest {
    /// Package name.
    pub name: String,
    /// Version to metadata, ascending.
    pub versions: BTreeMap<Version, VersionMeta>,
}

impl PackageManifest {
    /// Build from raw registry keys, validating each version literal.
    ///
    /// # Errors
    /// Returns [`Error::BadVersion`] on an unparsable version key.
    pub fn from_versions(
        name: impl Into<String>,
        raw: BTreeMap<String, VersionMeta>,
    ) -> Result<Self> {
        let mut versions = BTreeMap::new();
        for (literal, meta) in raw {
            versions.insert(parse_version(&literal)?, meta);
        }
        Ok(Self {
            name: name.into(),
            versions,
        })
    }

    /// Manifest with a single known version, as synthesized from a lock
    /// entry.
    #[must_use]
    pub fn single(name: impl Into<String>, version: Version, meta: VersionMeta) -> Self {
        let mut versions = BTreeMap::new();
        versions.insert(version, meta);
        Self {
            name: name.into(),
            versions,
        }
    }
}

/// The per-project `package.json`.
///
/// Both dependency maps serialize in sorted-key order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectManifest {
    /// Project name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Project version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Runtime dependencies.
    #[serde(default)]
    pub dependencies: BTreeMap<String, VersionRange>,
    /// Development dependencies.
    #[serde(
        default,
        rename = "devDependencies",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub dev_dependencies: BTreeMap<String, VersionRange>,
}

/// Default project manifest filename.
pub const MANIFEST_FILENAME: &str = "package.json";

impl ProjectManifest {
    /// Load from a file.
    ///
    /// # Errors
    /// Returns IO or JSON errors.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        crate::json::from_json_slice(&data)
    }

    /// Save to a file, pretty-printed with sorted keys.
    ///
    /// # Errors
    /// Returns IO or JSON errors.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut data = crate::json::to_json_pretty(self)?;
        data.push('\n');
        std::fs::write(path, data).map_err(|e| Error::io(path, e))
    }

    /// Add a requested package, routing into `devDependencies` when `dev`.
    ///
    /// Accepts `name` or `name@range`; a bare name records the empty range.
    ///
    /// # Errors
    /// Returns [`Error::BadRange`] on an unparsable range part.
    pub fn add_request(&mut self, spec: &str, dev: bool) -> Result<()> {
        let (name, range) = split_request(spec)?;
        let target = if dev {
            &mut self.dev_dependencies
        } else {
            &mut self.dependencies
        };
        target.insert(name, range);
        Ok(())
    }

    /// Replace the recorded range for a root dependency, whichever map it
    /// lives in.
    pub fn rewrite_range(&mut self, name: &str, range: VersionRange) {
        if let Some(slot) = self.dependencies.get_mut(name) {
            *slot = range;
        } else if let Some(slot) = self.dev_dependencies.get_mut(name) {
            *slot = range;
        }
    }

    /// Direct dependencies to resolve; dev dependencies are dropped when
    /// `production`.
    pub fn root_dependencies(
        &self,
        production: bool,
    ) -> impl Iterator<Item = (&String, &VersionRange)> {
        let dev = if production {
            None
        } else {
            Some(self.dev_dependencies.iter())
        };
        self.dependencies.iter().chain(dev.into_iter().flatten())
    }
}

/// Split a `name@range` request. The `@` is optional; scoped names
/// (`@scope/pkg`) keep their leading `@`.
fn split_request(spec: &str) -> Result<(String, VersionRange)> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(Error::InvalidManifest("empty package request".into()));
    }

    // Skip the first char so scoped names keep their leading `@`.
    let at = spec
        .char_indices()
        .skip(1)
        .find(|&(_, c)| c == '@')
        .map(|(i, _)| i);
    match at {
        Some(i) => {
            let range = VersionRange::parse(&spec[i + 1..])?;
            Ok((spec[..i].to_string(), range))
        }
        None => Ok((spec.to_string(), VersionRange::any())),
    }
}
