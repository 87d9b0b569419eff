//! Single-pass dependency resolver with nested placement.
//!
//! The resolver walks the dependency graph from the project's direct
//! dependencies, picking for every demand the highest version satisfying
//! its range. The first traversal to resolve a name claims the shared
//! top-level slot; later incompatible demands are nested under an ancestor
//! directory so both copies can coexist. There is no backtracking.
//!
//! Sibling traversals run concurrently, so on a cold run the plan depends
//! on which sibling binds a name first. Once the lock pins every
//! `name@range` demand, reruns are deterministic; tests that need a stable
//! plan prime the lock first.

use crate::lock::{LockEntry, LockStore};
use crate::source::ManifestSource;
use bero_core::{max_satisfying, Error, ProjectManifest, Result, VersionMeta, VersionRange};
use futures::future::try_join_all;
use parking_lot::Mutex;
use semver::Version;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the per-project module directory.
pub const MODULES_DIR: &str = "node_modules";

/// A package placed at the shared modules root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopLevelEntry {
    /// Tarball URL.
    pub url: String,
    /// SHA-1 hex digest of the tarball.
    pub shasum: String,
    /// Chosen version.
    pub version: Version,
}

/// A package nested under an ancestor's private modules directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedEntry {
    /// Package name.
    pub name: String,
    /// Ancestor chain relative to the modules root; hops are joined with
    /// `/node_modules/`.
    pub parent_path: String,
    /// Tarball URL.
    pub url: String,
    /// SHA-1 hex digest of the tarball.
    pub shasum: String,
    /// Chosen version.
    pub version: Version,
}

/// The resolution plan.
#[derive(Debug, Default)]
pub struct Plan {
    /// At most one entry per name, extracted at `node_modules/<name>`.
    pub top_level: BTreeMap<String, TopLevelEntry>,
    /// Conflicting copies, extracted at
    /// `node_modules/<parent_path>/node_modules/<name>`.
    pub unsatisfied: Vec<NestedEntry>,
}

impl Plan {
    /// Total number of packages to install.
    #[must_use]
    pub fn len(&self) -> usize {
        self.top_level.len() + self.unsatisfied.len()
    }

    /// Whether the plan is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.top_level.is_empty() && self.unsatisfied.is_empty()
    }

    /// Drop duplicate `(name, parent_path, version)` nested entries,
    /// keeping the first.
    fn dedup_unsatisfied(&mut self) {
        let mut seen = std::collections::BTreeSet::new();
        self.unsatisfied.retain(|e| {
            seen.insert((e.name.clone(), e.parent_path.clone(), e.version.clone()))
        });
    }
}

/// Outcome of a resolution run.
#[derive(Debug)]
pub struct Outcome {
    /// The resolution plan.
    pub plan: Plan,
    /// Concrete caret ranges for root dependencies that were requested
    /// with the empty range, for rewriting the project manifest.
    pub root_pins: BTreeMap<String, VersionRange>,
}

/// One ancestor on the live traversal path.
#[derive(Debug, Clone)]
struct Frame {
    name: String,
    version: Version,
    dependencies: BTreeMap<String, VersionRange>,
}

type CollectFuture<'a> = Pin<Box<dyn Future<Output = Result<Version>> + Send + 'a>>;

/// The dependency resolver.
///
/// Bundles the manifest source, the lock store, and the in-progress plan.
/// Construct one per invocation; resolution state does not carry across
/// runs.
pub struct Resolver<S> {
    source: Arc<S>,
    lock: Arc<LockStore>,
    plan: Mutex<Plan>,
}

impl<S> std::fmt::Debug for Resolver<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}

impl<S: ManifestSource + 'static> Resolver<S> {
    /// Create a resolver over a manifest source and a lock store.
    pub fn new(source: Arc<S>, lock: Arc<LockStore>) -> Self {
        Self {
            source,
            lock,
            plan: Mutex::new(Plan::default()),
        }
    }

    /// Resolve a project manifest into a plan, populating the new lock as
    /// a side effect.
    ///
    /// Aborts on the first fatal error; outstanding sibling traversals are
    /// dropped and no partial plan is returned. The caller must not write
    /// the lock unless this returns `Ok`.
    ///
    /// # Errors
    /// Returns the first fatal resolution error.
    pub async fn resolve(&self, manifest: &ProjectManifest, production: bool) -> Result<Outcome> {
        let roots: Vec<(String, VersionRange)> = manifest
            .root_dependencies(production)
            .map(|(name, range)| (name.clone(), range.clone()))
            .collect();

        info!(roots = roots.len(), production, "starting resolution");

        let tasks = roots.iter().map(|(name, range)| {
            let name = name.clone();
            let range = range.clone();
            async move {
                let version = self.collect(name.clone(), range.clone(), Vec::new()).await?;
                Ok::<_, Error>((name, range, version))
            }
        });
        let resolved = try_join_all(tasks).await?;

        let mut root_pins = BTreeMap::new();
        for (name, range, version) in resolved {
            if range.is_any() {
                root_pins.insert(name, VersionRange::caret(&version));
            }
        }

        let mut plan = std::mem::take(&mut *self.plan.lock());
        plan.dedup_unsatisfied();

        info!(
            top_level = plan.top_level.len(),
            nested = plan.unsatisfied.len(),
            "resolution complete"
        );

        Ok(Outcome { plan, root_pins })
    }

    /// Resolve one demand and recurse into its dependencies.
    ///
    /// Returns the chosen version so root traversals can report their
    /// caret pin.
    fn collect(&self, name: String, range: VersionRange, stack: Vec<Frame>) -> CollectFuture<'_> {
        Box::pin(async move {
            // A locked demand short-circuits the network but still flows
            // through placement, lock re-anchoring, and descent.
            let manifest = match self.lock.get_item(&name, &range) {
                Some(locked) => Arc::new(locked),
                None => self.source.fetch_manifest(&name).await?,
            };

            let matched = max_satisfying(manifest.versions.keys(), &range)
                .ok_or_else(|| Error::NoMatchingVersion {
                    name: name.clone(),
                    range: range.to_string(),
                })?
                .clone();
            let meta = &manifest.versions[&matched];

            debug!(package = %name, range = %range, version = %matched, "resolved demand");

            self.place(&name, &range, &matched, meta, &stack);

            self.lock.update_or_create(
                LockStore::key(&name, &range),
                LockEntry {
                    version: matched.clone(),
                    url: meta.dist.tarball.clone(),
                    shasum: meta.dist.shasum.clone(),
                    dependencies: meta.dependencies.clone(),
                },
            );

            let mut next = stack;
            next.push(Frame {
                name: name.clone(),
                version: matched.clone(),
                dependencies: meta.dependencies.clone(),
            });

            let children: Vec<_> = meta
                .dependencies
                .iter()
                .filter(|&(dep, dep_range)| !forms_cycle(&next, dep, dep_range))
                .map(|(dep, dep_range)| self.collect(dep.clone(), dep_range.clone(), next.clone()))
                .collect();
            try_join_all(children).await?;

            Ok(matched)
        })
    }

    /// Decide where the chosen version goes: the shared root, a nested
    /// directory, or nowhere.
    fn place(
        &self,
        name: &str,
        range: &VersionRange,
        matched: &Version,
        meta: &VersionMeta,
        stack: &[Frame],
    ) {
        let mut plan = self.plan.lock();
        let existing = plan.top_level.get(name).map(|e| e.version.clone());

        match existing {
            None => {
                plan.top_level.insert(
                    name.to_string(),
                    TopLevelEntry {
                        url: meta.dist.tarball.clone(),
                        shasum: meta.dist.shasum.clone(),
                        version: matched.clone(),
                    },
                );
            }
            Some(ref existing) if range.matches(existing) => {
                // The top copy covers this demand, unless an ancestor pins
                // the name to a different range. Nest two frames above the
                // conflicting frame so directory-ascent lookup resolves the
                // nested copy first from everything beneath it.
                if let Some(conflict) = conflicting_ancestor(name, matched, stack) {
                    let start = conflict.saturating_sub(2);
                    let parent_path = join_path(&stack[start..]);
                    debug!(
                        package = %name,
                        version = %matched,
                        parent = %parent_path,
                        "ancestor conflict, nesting"
                    );
                    plan.unsatisfied.push(NestedEntry {
                        name: name.to_string(),
                        parent_path,
                        url: meta.dist.tarball.clone(),
                        shasum: meta.dist.shasum.clone(),
                        version: matched.clone(),
                    });
                }
            }
            Some(existing) => match stack.last() {
                Some(parent) => {
                    debug!(
                        package = %name,
                        version = %matched,
                        top = %existing,
                        parent = %parent.name,
                        "incompatible with top copy, nesting"
                    );
                    plan.unsatisfied.push(NestedEntry {
                        name: name.to_string(),
                        parent_path: parent.name.clone(),
                        url: meta.dist.tarball.clone(),
                        shasum: meta.dist.shasum.clone(),
                        version: matched.clone(),
                    });
                }
                None => {
                    // A direct root demand with no ancestor directory to
                    // nest into; the first binding stands.
                    warn!(
                        package = %name,
                        requested = %range,
                        bound = %existing,
                        "root demand lost the top-level race"
                    );
                }
            },
        }
    }
}

/// Whether descending into `dep` would re-enter a live ancestor.
fn forms_cycle(stack: &[Frame], dep: &str, dep_range: &VersionRange) -> bool {
    stack
        .iter()
        .any(|f| f.name == dep && dep_range.matches(&f.version))
}

/// Lowest stack index whose frame requires `name` at a range the chosen
/// version does not satisfy. Frames silent about `name` are compatible.
fn conflicting_ancestor(name: &str, version: &Version, stack: &[Frame]) -> Option<usize> {
    stack
        .iter()
        .position(|f| f.dependencies.get(name).is_some_and(|r| !r.matches(version)))
}

/// Join ancestor frames into a nested parent path.
fn join_path(frames: &[Frame]) -> String {
    frames
        .iter()
        .map(|f| f.name.as_str())
        .collect::<Vec<_>>()
        .join(&format!("/{MODULES_DIR}/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::LOCK_FILENAME;
    use crate::source::MemoryRegistry;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn project(deps: &[(&str, &str)]) -> ProjectManifest {
        let mut manifest = ProjectManifest::default();
        for (name, range) in deps {
            manifest.dependencies.insert(
                (*name).to_string(),
                VersionRange::parse(*range).unwrap(),
            );
        }
        manifest
    }

    fn resolver_for(
        source: MemoryRegistry,
        dir: &std::path::Path,
    ) -> Resolver<MemoryRegistry> {
        let lock = LockStore::load(dir.join(LOCK_FILENAME)).unwrap();
        Resolver::new(Arc::new(source), Arc::new(lock))
    }

    #[tokio::test]
    async fn diamond_compatible() {
        let source = MemoryRegistry::new();
        source.add_version("a", "1.0.0", vec![("c", "^1.0.0")]);
        source.add_version("b", "1.0.0", vec![("c", "^1.0.0")]);
        source.add_version("c", "1.0.0", vec![]);
        source.add_version("c", "1.1.0", vec![]);

        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_for(source, dir.path());
        let outcome = resolver
            .resolve(&project(&[("a", "^1.0.0"), ("b", "^1.0.0")]), false)
            .await
            .unwrap();

        let plan = outcome.plan;
        assert_eq!(plan.top_level.len(), 3);
        assert_eq!(plan.top_level["a"].version, v("1.0.0"));
        assert_eq!(plan.top_level["b"].version, v("1.0.0"));
        assert_eq!(plan.top_level["c"].version, v("1.1.0"));
        assert!(plan.unsatisfied.is_empty());
    }

    #[tokio::test]
    async fn diamond_incompatible() {
        let source = MemoryRegistry::new();
        source.add_version("a", "1.0.0", vec![("c", "^1.0.0")]);
        source.add_version("b", "1.0.0", vec![("c", "^2.0.0")]);
        source.add_version("c", "1.0.0", vec![]);
        source.add_version("c", "1.1.0", vec![]);
        source.add_version("c", "2.0.0", vec![]);

        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_for(source, dir.path());
        let outcome = resolver
            .resolve(&project(&[("a", "^1.0.0"), ("b", "^1.0.0")]), false)
            .await
            .unwrap();

        let plan = outcome.plan;
        let top = plan.top_level["c"].version.clone();
        assert!(top == v("1.1.0") || top == v("2.0.0"));
        assert_eq!(plan.unsatisfied.len(), 1);

        let nested = &plan.unsatisfied[0];
        assert_eq!(nested.name, "c");
        // The losing side's binder is the nested copy's parent.
        if top == v("1.1.0") {
            assert_eq!(nested.parent_path, "b");
            assert_eq!(nested.version, v("2.0.0"));
        } else {
            assert_eq!(nested.parent_path, "a");
            assert_eq!(nested.version, v("1.1.0"));
        }
    }

    #[tokio::test]
    async fn mutual_cycle_terminates() {
        let source = MemoryRegistry::new();
        source.add_version("a", "1.0.0", vec![("b", "^1.0.0")]);
        source.add_version("b", "1.0.0", vec![("a", "^1.0.0")]);

        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_for(source, dir.path());
        let outcome = resolver
            .resolve(&project(&[("a", "^1.0.0")]), false)
            .await
            .unwrap();

        let plan = outcome.plan;
        assert_eq!(plan.top_level["a"].version, v("1.0.0"));
        assert_eq!(plan.top_level["b"].version, v("1.0.0"));
        assert!(plan.unsatisfied.is_empty());
    }

    #[tokio::test]
    async fn self_cycle_terminates() {
        let source = MemoryRegistry::new();
        source.add_version("a", "1.0.0", vec![("a", "^1.0.0")]);

        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_for(source, dir.path());
        let outcome = resolver
            .resolve(&project(&[("a", "^1.0.0")]), false)
            .await
            .unwrap();
        assert_eq!(outcome.plan.top_level.len(), 1);
    }

    #[tokio::test]
    async fn no_matching_version_is_fatal() {
        let source = MemoryRegistry::new();
        source.add_version("a", "1.0.0", vec![]);

        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_for(source, dir.path());
        let err = resolver
            .resolve(&project(&[("a", "^2.0.0")]), false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::NoMatchingVersion { name, range } if name == "a" && range == "^2.0.0"
        ));
    }

    #[tokio::test]
    async fn lock_replay_bypasses_network() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCK_FILENAME);

        // Prime a lock binding a@^1.0.0 -> 1.2.3.
        let source = MemoryRegistry::new();
        source.add_version("a", "1.0.0", vec![]);
        source.add_version("a", "1.2.3", vec![]);
        let resolver = resolver_for(source, dir.path());
        resolver
            .resolve(&project(&[("a", "^1.0.0")]), false)
            .await
            .unwrap();
        resolver.lock.write_lock().unwrap();

        // The registry has since gained 1.4.0; the lock still pins 1.2.3.
        let source = MemoryRegistry::new();
        source.add_version("a", "1.2.3", vec![]);
        source.add_version("a", "1.4.0", vec![]);

        let lock = LockStore::load(&path).unwrap();
        let source = Arc::new(source);
        let resolver = Resolver::new(Arc::clone(&source), Arc::new(lock));
        let outcome = resolver
            .resolve(&project(&[("a", "^1.0.0")]), false)
            .await
            .unwrap();

        assert_eq!(outcome.plan.top_level["a"].version, v("1.2.3"));
        assert_eq!(source.fetch_count("a"), 0);
    }

    #[tokio::test]
    async fn unconstrained_root_gets_caret_pin() {
        let source = MemoryRegistry::new();
        source.add_version("a", "3.0.0", vec![]);
        source.add_version("a", "3.2.1", vec![]);

        let mut manifest = ProjectManifest::default();
        manifest
            .dependencies
            .insert("a".to_string(), VersionRange::any());

        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_for(source, dir.path());
        let outcome = resolver.resolve(&manifest, false).await.unwrap();

        assert_eq!(outcome.plan.top_level["a"].version, v("3.2.1"));
        assert_eq!(outcome.root_pins["a"].as_str(), "^3.2.1");
        assert!(resolver.lock.new_entry("a@").is_some());

        // A second run with the rewritten range leaves the pin alone.
        manifest.rewrite_range("a", outcome.root_pins["a"].clone());
        let source = MemoryRegistry::new();
        source.add_version("a", "3.2.1", vec![]);
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_for(source, dir.path());
        let outcome = resolver.resolve(&manifest, false).await.unwrap();
        assert!(outcome.root_pins.is_empty());
        assert!(resolver.lock.new_entry("a@^3.2.1").is_some());
    }

    #[tokio::test]
    async fn shallow_ancestor_conflict_clamps_parent_path() {
        // w -> {c^1.0.0, p^1.0.0}; p -> {c^2.0.0, q^1.0.0}; q -> c^1.0.0.
        // q's demand is covered by the top-level c, but ancestor p pins c
        // to ^2.0.0: the conflict sits at stack index 1, so the two-above
        // offset clamps to the start of the stack.
        let source = MemoryRegistry::new();
        source.add_version("w", "1.0.0", vec![("c", "^1.0.0"), ("p", "^1.0.0")]);
        source.add_version("c", "1.1.0", vec![]);
        source.add_version("c", "2.0.0", vec![]);
        source.add_version("p", "1.0.0", vec![("c", "^2.0.0"), ("q", "^1.0.0")]);
        source.add_version("q", "1.0.0", vec![("c", "^1.0.0")]);

        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_for(source, dir.path());
        let outcome = resolver
            .resolve(&project(&[("w", "^1.0.0")]), false)
            .await
            .unwrap();

        let plan = outcome.plan;
        assert_eq!(plan.top_level["c"].version, v("1.1.0"));

        // p's own demand for c^2.0.0 nests directly under p.
        assert!(plan.unsatisfied.iter().any(|e| {
            e.name == "c" && e.version == v("2.0.0") && e.parent_path == "p"
        }));

        // q's compatible demand conflicts with ancestor p; the clamped
        // slice keeps the full chain.
        assert!(plan.unsatisfied.iter().any(|e| {
            e.name == "c"
                && e.version == v("1.1.0")
                && e.parent_path == "w/node_modules/p/node_modules/q"
        }));
    }

    #[tokio::test]
    async fn duplicate_nested_entries_are_deduplicated() {
        // z is traversed twice under two different demand keys (^1.0.0
        // via a, ~1.0.0 from the root) resolving to the same version; both
        // traversals push the identical nested copy of c.
        let source = MemoryRegistry::new();
        source.add_version("a", "1.0.0", vec![("c", "^1.0.0"), ("z", "^1.0.0")]);
        source.add_version("c", "1.0.0", vec![]);
        source.add_version("c", "2.0.0", vec![]);
        source.add_version("z", "1.0.0", vec![("c", "^2.0.0")]);

        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_for(source, dir.path());
        let outcome = resolver
            .resolve(&project(&[("a", "^1.0.0"), ("z", "~1.0.0")]), false)
            .await
            .unwrap();

        let nested: Vec<_> = outcome
            .plan
            .unsatisfied
            .iter()
            .filter(|e| e.name == "c" && e.parent_path == "z")
            .collect();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].version, v("2.0.0"));
    }

    #[tokio::test]
    async fn lock_keys_use_requested_ranges() {
        let source = MemoryRegistry::new();
        source.add_version("a", "1.0.0", vec![("b", "~2.1.0")]);
        source.add_version("b", "2.1.5", vec![]);

        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_for(source, dir.path());
        resolver
            .resolve(&project(&[("a", "^1.0.0")]), false)
            .await
            .unwrap();

        assert!(resolver.lock.new_entry("a@^1.0.0").is_some());
        assert!(resolver.lock.new_entry("b@~2.1.0").is_some());
        assert_eq!(resolver.lock.new_len(), 2);
    }

    #[tokio::test]
    async fn production_drops_dev_dependencies() {
        let source = MemoryRegistry::new();
        source.add_version("a", "1.0.0", vec![]);
        source.add_version("d", "1.0.0", vec![]);

        let mut manifest = project(&[("a", "^1.0.0")]);
        manifest
            .dev_dependencies
            .insert("d".to_string(), VersionRange::parse("^1.0.0").unwrap());

        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_for(source, dir.path());
        let outcome = resolver.resolve(&manifest, true).await.unwrap();
        assert!(outcome.plan.top_level.contains_key("a"));
        assert!(!outcome.plan.top_level.contains_key("d"));
    }
}
