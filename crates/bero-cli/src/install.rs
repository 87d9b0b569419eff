//! The install driver.
//!
//! Orchestrates a run end to end: read the project manifest, fold in any
//! requested packages, load the old lock, resolve, rewrite the manifest
//! and replace the lock, then hand the plan to the installer.

use crate::fetcher::RegistrySource;
use crate::output;
use crate::Cli;
use anyhow::{bail, Context};
use bero_core::{ProjectManifest, MANIFEST_FILENAME};
use bero_installer::Installer;
use bero_registry::{RegistryClient, RegistryConfig};
use bero_resolver::{LockStore, Resolver, LOCK_FILENAME};
use console::style;
use std::sync::Arc;
use tracing::info;

/// Run an install.
pub async fn run(cli: &Cli) -> anyhow::Result<()> {
    let project_root = match &cli.dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("cannot determine working directory")?,
    };

    let manifest_path = project_root.join(MANIFEST_FILENAME);
    let mut manifest = if manifest_path.exists() {
        ProjectManifest::load(&manifest_path)?
    } else if cli.packages.is_empty() {
        bail!("no {MANIFEST_FILENAME} in {}", project_root.display());
    } else {
        output::warning(&format!("no {MANIFEST_FILENAME} found, creating one"));
        ProjectManifest::default()
    };

    for spec in &cli.packages {
        manifest.add_request(spec, cli.save_dev)?;
    }

    let client = match &cli.registry {
        Some(url) => RegistryClient::new(RegistryConfig::with_url(url.clone()))?,
        None => RegistryClient::with_defaults()?,
    };
    info!(registry = %client.url(), "using registry");

    let lock = Arc::new(LockStore::load(project_root.join(LOCK_FILENAME))?);
    let source = Arc::new(RegistrySource::new(Arc::new(client)));
    let resolver = Resolver::new(source, Arc::clone(&lock));

    output::status("Resolving", "dependencies...");
    let outcome = resolver.resolve(&manifest, cli.production).await?;

    // Pin originally unconstrained roots to the caret of what was just
    // resolved, then persist the manifest and the new lock.
    for (name, range) in &outcome.root_pins {
        manifest.rewrite_range(name, range.clone());
    }
    manifest.save(&manifest_path)?;
    lock.write_lock()?;

    let plan = &outcome.plan;
    output::status(
        "Installing",
        &format!(
            "{} top-level, {} nested",
            plan.top_level.len(),
            plan.unsatisfied.len()
        ),
    );

    let installer = Installer::with_defaults()?;
    let report = installer.install(plan, &project_root).await;

    for (name, err) in &report.failures {
        output::error(&format!("{name}: {err}"));
    }

    if !report.is_ok() {
        bail!("{} package(s) failed to install", report.failures.len());
    }

    println!(
        "{} {} package(s)",
        style("Installed").green().bold(),
        report.installed
    );
    Ok(())
}
