//! Core types for the Bero package manager.
//!
//! This crate holds the pieces every other Bero crate builds on: the
//! npm-compatible version algebra, the registry and project manifest data
//! model, the error taxonomy, and SHA-1 shasum handling for tarballs.

#![deny(clippy::all)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod digest;
mod error;
pub mod json;
pub mod manifest;
pub mod version;

pub use digest::{Shasum, ShasumHasher};
pub use error::{Error, Result};
pub use manifest::{
    Dist, PackageManifest, ProjectManifest, VersionMeta, MANIFEST_FILENAME,
};
pub use semver::Version;
pub use version::{max_satisfying, parse_version, VersionRange};
