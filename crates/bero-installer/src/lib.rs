//! Package installation for Bero.
//!
//! Takes a resolution plan and materializes it: every entry's tarball is
//! streamed to a temp file while its SHA-1 digest accumulates, verified
//! against the recorded shasum, and extracted into the target directory
//! with the tarball's leading `package/` component stripped. Downloads run
//! with bounded concurrency; a failed entry does not abort the rest of the
//! plan.

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

use bero_core::{Error, Result, Shasum, ShasumHasher};
use bero_resolver::{Plan, MODULES_DIR};
use flate2::read::GzDecoder;
use futures::StreamExt;
use reqwest::Client;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Install options.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Maximum concurrent downloads.
    pub concurrency: usize,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Per-request timeout.
    pub read_timeout: Duration,
    /// Number of retries per entry.
    pub retries: u32,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            concurrency: 8,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            retries: 3,
        }
    }
}

/// One package to fetch and extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallItem {
    /// Package name.
    pub name: String,
    /// Tarball URL.
    pub url: String,
    /// Expected SHA-1 hex digest.
    pub shasum: String,
    /// Extraction target directory.
    pub dest: PathBuf,
}

/// Result of installing a plan.
#[derive(Debug, Default)]
pub struct InstallReport {
    /// Number of packages installed.
    pub installed: usize,
    /// Entries that failed, with their errors.
    pub failures: Vec<(String, Error)>,
}

impl InstallReport {
    /// Whether every entry installed cleanly.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Compute the install items for a plan.
///
/// Top-level entries extract at `<root>/node_modules/<name>`; nested
/// entries at `<root>/node_modules/<parent_path>/node_modules/<name>`,
/// where `parent_path` already carries its inner `node_modules` hops. The
/// resolver guarantees the targets are distinct.
#[must_use]
pub fn plan_items(plan: &Plan, project_root: &Path) -> Vec<InstallItem> {
    let modules_root = project_root.join(MODULES_DIR);
    let mut items = Vec::with_capacity(plan.len());

    for (name, entry) in &plan.top_level {
        items.push(InstallItem {
            name: name.clone(),
            url: entry.url.clone(),
            shasum: entry.shasum.clone(),
            dest: modules_root.join(name),
        });
    }

    for entry in &plan.unsatisfied {
        items.push(InstallItem {
            name: entry.name.clone(),
            url: entry.url.clone(),
            shasum: entry.shasum.clone(),
            dest: modules_root
                .join(&entry.parent_path)
                .join(MODULES_DIR)
                .join(&entry.name),
        });
    }

    items
}

/// Parallel tarball installer.
#[derive(Debug)]
pub struct Installer {
    client: Client,
    options: InstallOptions,
}

impl Installer {
    /// Create an installer.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(options: InstallOptions) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.read_timeout)
            .gzip(false)
            .build()
            .map_err(|e| Error::RegistryUnreachable(e.to_string()))?;

        Ok(Self { client, options })
    }

    /// Create an installer with default options.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn with_defaults() -> Result<Self> {
        Self::new(InstallOptions::default())
    }

    /// Install a plan under the project root.
    ///
    /// Entries fail independently; the report carries every failure.
    pub async fn install(&self, plan: &Plan, project_root: &Path) -> InstallReport {
        let items = plan_items(plan, project_root);
        info!(packages = items.len(), "installing plan");

        let results: Vec<(String, Result<()>)> = futures::stream::iter(items)
            .map(|item| async move {
                let name = item.name.clone();
                (name, self.install_item(item).await)
            })
            .buffer_unordered(self.options.concurrency)
            .collect()
            .await;

        let mut report = InstallReport::default();
        for (name, result) in results {
            match result {
                Ok(()) => report.installed += 1,
                Err(e) => {
                    warn!(package = %name, error = %e, "install failed");
                    report.failures.push((name, e));
                }
            }
        }

        info!(
            installed = report.installed,
            failed = report.failures.len(),
            "install complete"
        );
        report
    }

    async fn install_item(&self, item: InstallItem) -> Result<()> {
        let mut last_error = None;

        for attempt in 0..=self.options.retries {
            if attempt > 0 {
                debug!(package = %item.name, attempt, "retrying download");
                tokio::time::sleep(Duration::from_secs(u64::from(attempt))).await;
            }

            match self.fetch_verified(&item).await {
                Ok(tarball) => return extract_package(tarball, &item.dest).await,
                // A digest mismatch will not improve on retry.
                Err(e @ Error::DigestMismatch { .. }) => return Err(e),
                Err(e) => {
                    debug!(package = %item.name, error = %e, attempt, "download failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::RegistryUnreachable("download failed".into())))
    }

    /// Stream the tarball to a temp file, hashing as it goes, and verify
    /// the digest.
    async fn fetch_verified(&self, item: &InstallItem) -> Result<NamedTempFile> {
        debug!(package = %item.name, url = %item.url, "downloading tarball");

        let response = self
            .client
            .get(&item.url)
            .send()
            .await
            .map_err(|e| Error::RegistryUnreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::RegistryUnreachable(format!(
                "HTTP {} for {}",
                response.status(),
                item.url
            )));
        }

        let mut tarball = NamedTempFile::new().map_err(|e| Error::io(&item.dest, e))?;
        let mut hasher = ShasumHasher::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::RegistryUnreachable(e.to_string()))?;
            hasher.update(&chunk);
            tarball
                .write_all(&chunk)
                .map_err(|e| Error::io(&item.dest, e))?;
        }
        tarball.flush().map_err(|e| Error::io(&item.dest, e))?;

        check_digest(&item.name, &item.shasum, hasher.finalize())?;
        Ok(tarball)
    }
}

/// Verify a computed digest against the recorded shasum.
fn check_digest(name: &str, expected: &str, actual: Shasum) -> Result<()> {
    match Shasum::from_hex(expected) {
        Some(want) if want == actual => Ok(()),
        _ => Err(Error::DigestMismatch {
            name: name.to_string(),
            expected: expected.to_string(),
            actual: actual.to_hex(),
        }),
    }
}

/// Extract a verified tarball into its target directory.
async fn extract_package(tarball: NamedTempFile, dest: &Path) -> Result<()> {
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || extract_tar_gz(tarball.path(), &dest))
        .await
        .map_err(|e| Error::Archive(e.to_string()))?
}

/// Extract a gzipped tarball, stripping the leading `package/` component.
fn extract_tar_gz(tarball: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest).map_err(|e| Error::io(dest, e))?;

    let file = std::fs::File::open(tarball).map_err(|e| Error::io(tarball, e))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));

    for entry in archive
        .entries()
        .map_err(|e| Error::Archive(e.to_string()))?
    {
        let mut entry = entry.map_err(|e| Error::Archive(e.to_string()))?;
        let path = entry
            .path()
            .map_err(|e| Error::Archive(e.to_string()))?
            .into_owned();

        // Registry tarballs wrap their contents in a single directory.
        let stripped: PathBuf = path.components().skip(1).collect();
        if stripped.as_os_str().is_empty() {
            continue;
        }
        let out_path = dest.join(stripped);

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| Error::io(&out_path, e))?;
        } else if entry_type.is_file() {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }

            let mut out_file =
                std::fs::File::create(&out_path).map_err(|e| Error::io(&out_path, e))?;
            std::io::copy(&mut entry, &mut out_file).map_err(|e| Error::io(&out_path, e))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(mode) = entry.header().mode() {
                    std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))
                        .ok();
                }
            }
        }
    }

    Ok(())
}
