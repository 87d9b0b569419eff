//! Manifest-source abstraction.
//!
//! The resolver is generic over where package manifests come from. The
//! production source is the registry HTTP client; tests use the in-memory
//! [`MemoryRegistry`].

use bero_core::{Dist, PackageManifest, Result, Shasum, VersionMeta, VersionRange};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed manifest future.
pub type ManifestFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Arc<PackageManifest>>> + Send + 'a>>;

/// Source of package version manifests.
pub trait ManifestSource: Send + Sync {
    /// Fetch the full version manifest for a package.
    fn fetch_manifest(&self, name: &str) -> ManifestFuture<'_>;
}

/// In-memory manifest source for tests and offline resolution.
///
/// Counts fetches per package so tests can assert that a locked request
/// bypassed this source entirely.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    packages: Mutex<BTreeMap<String, BTreeMap<semver::Version, VersionMeta>>>,
    fetches: Mutex<BTreeMap<String, usize>>,
}

impl MemoryRegistry {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a package version with its dependencies.
    ///
    /// Tarball URL and shasum are synthesized from the coordinates.
    ///
    /// # Panics
    /// Panics on malformed version or range literals; this is a test
    /// convenience API.
    pub fn add_version(&self, name: &str, version: &str, deps: Vec<(&str, &str)>) {
        let version = bero_core::parse_version(version).expect("valid test version");
        let dependencies = deps
            .into_iter()
            .map(|(dep, range)| {
                (
                    dep.to_string(),
                    VersionRange::parse(range).expect("valid test range"),
                )
            })
            .collect();

        let meta = VersionMeta {
            dependencies,
            dist: Dist {
                tarball: format!("https://registry.example/{name}/-/{name}-{version}.tgz"),
                shasum: Shasum::from_bytes(format!("{name}@{version}").as_bytes()).to_hex(),
            },
        };

        self.packages
            .lock()
            .entry(name.to_string())
            .or_default()
            .insert(version, meta);
    }

    /// How many times a package manifest was fetched.
    #[must_use]
    pub fn fetch_count(&self, name: &str) -> usize {
        self.fetches.lock().get(name).copied().unwrap_or(0)
    }
}

impl ManifestSource for MemoryRegistry {
    fn fetch_manifest(&self, name: &str) -> ManifestFuture<'_> {
        let name = name.to_string();
        Box::pin(async move {
            *self.fetches.lock().entry(name.clone()).or_default() += 1;

            let versions = self
                .packages
                .lock()
                .get(&name)
                .cloned()
                .ok_or_else(|| bero_core::Error::PackageNotFound { name: name.clone() })?;

            Ok(Arc::new(PackageManifest {
                name,
                versions,
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_registry_serves_versions() {
        let source = MemoryRegistry::new();
        source.add_version("a", "1.0.0", vec![("b", "^1.0.0")]);
        source.add_version("a", "1.1.0", vec![]);

        let manifest = source.fetch_manifest("a").await.unwrap();
        assert_eq!(manifest.versions.len(), 2);
        assert_eq!(source.fetch_count("a"), 1);
        assert_eq!(source.fetch_count("b"), 0);
    }

    #[tokio::test]
    async fn unknown_package() {
        let source = MemoryRegistry::new();
        let err = source.fetch_manifest("ghost").await.unwrap_err();
        assert!(matches!(
            err,
            bero_core::Error::PackageNotFound { name } if name == "ghost"
        ));
    }
}
