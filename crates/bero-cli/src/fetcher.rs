//! Bridges the registry client into the resolver's source abstraction.

use bero_registry::RegistryClient;
use bero_resolver::{ManifestFuture, ManifestSource};
use std::sync::Arc;

/// Registry-backed manifest source.
#[derive(Debug)]
pub struct RegistrySource {
    client: Arc<RegistryClient>,
}

impl RegistrySource {
    /// Wrap a registry client.
    pub fn new(client: Arc<RegistryClient>) -> Self {
        Self { client }
    }
}

impl ManifestSource for RegistrySource {
    fn fetch_manifest(&self, name: &str) -> ManifestFuture<'_> {
        let name = name.to_string();
        Box::pin(async move { self.client.fetch_manifest(&name).await })
    }
}
