//! The two-file lock protocol.
//!
//! A [`LockStore`] holds two disjoint maps keyed by `"<name>@<range>"`: the
//! old lock, loaded once from disk and never mutated, and the new lock,
//! accumulated during resolution and serialized as the sole output. A
//! second run over unchanged inputs replays every pinned version without
//! touching the network and re-serializes byte-identically.

use bero_core::{Dist, Error, PackageManifest, Result, VersionMeta, VersionRange};
use parking_lot::Mutex;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Default lock filename at the project root.
pub const LOCK_FILENAME: &str = "bero-pm.yml";

/// One pinned resolution, keyed by the demand that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    /// Pinned version.
    pub version: Version,
    /// Tarball URL.
    pub url: String,
    /// SHA-1 hex digest of the tarball.
    pub shasum: String,
    /// Dependencies of the pinned version.
    #[serde(default)]
    pub dependencies: BTreeMap<String, VersionRange>,
}

/// Lock store with a read-only old lock and a write-accumulated new lock.
#[derive(Debug)]
pub struct LockStore {
    path: PathBuf,
    old: BTreeMap<String, LockEntry>,
    new: Mutex<BTreeMap<String, LockEntry>>,
}

impl LockStore {
    /// Load the lock file at `path`. An absent file is not an error.
    ///
    /// # Errors
    /// Returns [`Error::CorruptLock`] if the file exists but cannot be
    /// parsed, and IO errors for anything other than a missing file.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let old = match std::fs::read_to_string(&path) {
            Ok(data) => serde_yaml::from_str(&data).map_err(|e| Error::CorruptLock {
                path: path.clone(),
                message: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(Error::io(&path, e)),
        };

        debug!(path = %path.display(), entries = old.len(), "loaded lock");

        Ok(Self {
            path,
            old,
            new: Mutex::new(BTreeMap::new()),
        })
    }

    /// The lock key for a demand: the requested range verbatim, empty for
    /// an unconstrained root request.
    #[must_use]
    pub fn key(name: &str, range: &VersionRange) -> String {
        format!("{name}@{range}")
    }

    /// Look up a demand in the old lock and synthesize a single-version
    /// manifest for it, so locked and fresh requests take the same path
    /// through the resolver.
    #[must_use]
    pub fn get_item(&self, name: &str, range: &VersionRange) -> Option<PackageManifest> {
        let entry = self.old.get(&Self::key(name, range))?;
        debug!(package = %name, version = %entry.version, "lock hit");

        Some(PackageManifest::single(
            name,
            entry.version.clone(),
            VersionMeta {
                dependencies: entry.dependencies.clone(),
                dist: Dist {
                    tarball: entry.url.clone(),
                    shasum: entry.shasum.clone(),
                },
            },
        ))
    }

    /// Merge an entry into the new lock. Last writer wins.
    pub fn update_or_create(&self, key: String, entry: LockEntry) {
        self.new.lock().insert(key, entry);
    }

    /// Number of entries accumulated in the new lock.
    #[must_use]
    pub fn new_len(&self) -> usize {
        self.new.lock().len()
    }

    /// Clone an accumulated entry, if present.
    #[must_use]
    pub fn new_entry(&self, key: &str) -> Option<LockEntry> {
        self.new.lock().get(key).cloned()
    }

    /// Serialize the new lock with recursively sorted keys and atomically
    /// replace the lock file.
    ///
    /// # Errors
    /// Returns YAML or IO errors.
    pub fn write_lock(&self) -> Result<()> {
        let entries = self.new.lock().clone();
        let data = serde_yaml::to_string(&entries)?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(&self.path, e))?;
        tmp.write_all(data.as_bytes())
            .map_err(|e| Error::io(&self.path, e))?;
        tmp.persist(&self.path)
            .map_err(|e| Error::io(&self.path, e.error))?;

        info!(path = %self.path.display(), entries = entries.len(), "wrote lock");
        Ok(())
    }
}
