//! Dependency resolution and locking for Bero.
//!
//! This crate is the core of the package manager: given a project's direct
//! dependencies it produces an installation plan — the shared top-level
//! map plus the nested copies needed where ranges conflict — and records
//! an exact, reproducible lock.
//!
//! # Architecture
//!
//! - [`source`]: where version manifests come from (registry client in
//!   production, [`MemoryRegistry`] in tests)
//! - [`lock`]: the two-file lock protocol (read-only old lock, accumulated
//!   new lock, deterministic YAML serialization)
//! - [`resolver`]: the single-pass traversal with cycle detection,
//!   conflict classification, and nested placement
//!
//! # Example
//!
//! ```rust,ignore
//! use bero_resolver::{LockStore, MemoryRegistry, Resolver, LOCK_FILENAME};
//! use std::sync::Arc;
//!
//! let source = MemoryRegistry::new();
//! source.add_version("left-pad", "1.3.0", vec![]);
//!
//! let lock = LockStore::load(LOCK_FILENAME)?;
//! let resolver = Resolver::new(Arc::new(source), Arc::new(lock));
//! let outcome = resolver.resolve(&manifest, false).await?;
//!
//! for (name, entry) in &outcome.plan.top_level {
//!     println!("{name} @ {}", entry.version);
//! }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod lock;
pub mod resolver;
pub mod source;

pub use lock::{LockEntry, LockStore, LOCK_FILENAME};
pub use resolver::{NestedEntry, Outcome, Plan, Resolver, TopLevelEntry, MODULES_DIR};
pub use source::{ManifestFuture, ManifestSource, MemoryRegistry};

#[cfg(test)]
mod tests {
    use super::*;
    use bero_core::{ProjectManifest, VersionRange};
    use std::sync::Arc;

    fn source_fixture() -> MemoryRegistry {
        let source = MemoryRegistry::new();
        source.add_version("a", "1.0.0", vec![("c", "^1.0.0")]);
        source.add_version("b", "1.0.0", vec![("c", "^2.0.0")]);
        source.add_version("c", "1.1.0", vec![]);
        source.add_version("c", "2.0.0", vec![]);
        source
    }

    fn manifest_fixture() -> ProjectManifest {
        let mut manifest = ProjectManifest::default();
        manifest.dependencies.insert(
            "a".to_string(),
            VersionRange::parse("^1.0.0").unwrap(),
        );
        manifest.dependencies.insert(
            "b".to_string(),
            VersionRange::parse("^1.0.0").unwrap(),
        );
        manifest
    }

    #[tokio::test]
    async fn primed_lock_reruns_are_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCK_FILENAME);

        // Cold run primes the lock.
        let lock = Arc::new(LockStore::load(&path).unwrap());
        let resolver = Resolver::new(Arc::new(source_fixture()), Arc::clone(&lock));
        resolver.resolve(&manifest_fixture(), false).await.unwrap();
        lock.write_lock().unwrap();
        let first = std::fs::read(&path).unwrap();

        // Replay run must serialize the same bytes.
        let lock = Arc::new(LockStore::load(&path).unwrap());
        let resolver = Resolver::new(Arc::new(source_fixture()), Arc::clone(&lock));
        let outcome = resolver.resolve(&manifest_fixture(), false).await.unwrap();
        lock.write_lock().unwrap();
        let second = std::fs::read(&path).unwrap();

        assert_eq!(first, second);
        assert_eq!(outcome.plan.top_level.len(), 3);
    }

    #[tokio::test]
    async fn failed_resolution_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCK_FILENAME);

        let source = MemoryRegistry::new();
        source.add_version("a", "1.0.0", vec![("missing", "^1.0.0")]);

        let lock = Arc::new(LockStore::load(&path).unwrap());
        let resolver = Resolver::new(Arc::new(source), Arc::clone(&lock));

        let mut manifest = ProjectManifest::default();
        manifest.dependencies.insert(
            "a".to_string(),
            VersionRange::parse("^1.0.0").unwrap(),
        );

        assert!(resolver.resolve(&manifest, false).await.is_err());
        // The driver only writes the lock on success; the file was never
        // created.
        assert!(!path.exists());
    }
}
