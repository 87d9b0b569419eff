//! Registry client for Bero.
//!
//! Fetches per-package version manifests from an npm-style registry:
//! `GET {registry}/{name}` returns a JSON document mapping version strings
//! to `{ dependencies, dist: { tarball, shasum } }`.

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

use bero_core::{Error, PackageManifest, Result, VersionMeta};
use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Default registry URL.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Registry base URL.
    pub url: Url,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Total request timeout.
    pub timeout: Duration,
}

impl RegistryConfig {
    /// Config for a specific registry URL, with default timeouts.
    #[must_use]
    pub fn with_url(url: Url) -> Self {
        Self {
            url,
            connect_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
        }
    }

    /// Config for the default registry.
    ///
    /// # Errors
    /// Returns error if the default registry URL fails to parse.
    pub fn default_registry() -> Result<Self> {
        let url = Url::parse(DEFAULT_REGISTRY)
            .map_err(|e| Error::RegistryUnreachable(e.to_string()))?;
        Ok(Self::with_url(url))
    }
}

/// Client for fetching package manifests, with a per-name response cache
/// that lives for the duration of the client.
#[derive(Debug)]
pub struct RegistryClient {
    config: RegistryConfig,
    client: Client,
    cache: DashMap<String, Arc<PackageManifest>>,
}

impl RegistryClient {
    /// Create a new registry client.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: RegistryConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .gzip(true)
            .build()
            .map_err(|e| Error::RegistryUnreachable(e.to_string()))?;

        Ok(Self {
            config,
            client,
            cache: DashMap::new(),
        })
    }

    /// Create a client for the default registry.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn with_defaults() -> Result<Self> {
        Self::new(RegistryConfig::default_registry()?)
    }

    /// Get the registry base URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.config.url
    }

    /// Fetch the version manifest for a package.
    ///
    /// # Errors
    /// Returns [`Error::PackageNotFound`] on 404,
    /// [`Error::RegistryUnreachable`] on transport failure, and
    /// [`Error::BadVersion`] on an unparsable version key in the response.
    pub async fn fetch_manifest(&self, name: &str) -> Result<Arc<PackageManifest>> {
        if let Some(cached) = self.cache.get(name) {
            debug!(package = %name, "manifest cache hit");
            return Ok(Arc::clone(&cached));
        }

        let manifest = Arc::new(self.fetch_remote(name).await?);
        self.cache.insert(name.to_string(), Arc::clone(&manifest));
        Ok(manifest)
    }

    async fn fetch_remote(&self, name: &str) -> Result<PackageManifest> {
        let url = self
            .config
            .url
            .join(name)
            .map_err(|e| Error::RegistryUnreachable(e.to_string()))?;
        debug!(url = %url, "fetching manifest");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| Error::RegistryUnreachable(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::PackageNotFound {
                name: name.to_string(),
            });
        }

        if !response.status().is_success() {
            return Err(Error::RegistryUnreachable(format!(
                "HTTP {} for {}",
                response.status(),
                url
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::RegistryUnreachable(e.to_string()))?;

        let raw: BTreeMap<String, VersionMeta> = bero_core::json::from_json_slice(&body)?;
        let manifest = PackageManifest::from_versions(name, raw)?;

        info!(
            package = %name,
            versions = manifest.versions.len(),
            "fetched manifest"
        );

        Ok(manifest)
    }
}
