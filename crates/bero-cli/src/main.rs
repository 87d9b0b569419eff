//! Bero CLI - a minimal npm-style package manager.
//!
//! `bero` installs a project's dependency graph into `node_modules/`,
//! records an exact lock in `bero-pm.yml`, and replays the lock on
//! subsequent runs.

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

mod fetcher;
mod install;
mod output;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Bero - install dependencies and record a reproducible lock
#[derive(Parser, Debug)]
#[command(name = "bero")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Packages to add before resolving (`name` or `name@range`)
    pub packages: Vec<String>,

    /// Record added packages as development dependencies
    #[arg(short = 'D', long, alias = "dev")]
    pub save_dev: bool,

    /// Skip development dependencies
    #[arg(long)]
    pub production: bool,

    /// Registry URL (also honours BERO_REGISTRY)
    #[arg(long, env = "BERO_REGISTRY")]
    pub registry: Option<Url>,

    /// Project directory
    #[arg(short = 'd', long)]
    pub dir: Option<PathBuf>,

    /// Enable verbose output (-v, -vv for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long)]
    pub quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 if cli.quiet => Level::ERROR,
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            output::error(&format!("failed to create runtime: {e}"));
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(install::run(&cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_packages_and_flags() {
        let cli = Cli::parse_from(["bero", "left-pad@^1.3.0", "tape", "-D"]);
        assert_eq!(cli.packages, vec!["left-pad@^1.3.0", "tape"]);
        assert!(cli.save_dev);
        assert!(!cli.production);
    }

    #[test]
    fn parses_production() {
        let cli = Cli::parse_from(["bero", "--production"]);
        assert!(cli.packages.is_empty());
        assert!(cli.production);
    }
}
