//! Error types for Bero operations.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Bero.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed version literal.
    #[error("invalid version '{literal}'")]
    BadVersion {
        /// The offending literal.
        literal: String,
    },

    /// Malformed range literal.
    #[error("invalid version range '{literal}'")]
    BadRange {
        /// The offending literal.
        literal: String,
    },

    /// No version satisfies the requested range.
    #[error("no version of '{name}' satisfies '{range}'")]
    NoMatchingVersion {
        /// Package name.
        name: String,
        /// Requested range.
        range: String,
    },

    /// Package does not exist in the registry.
    #[error("package '{name}' not found in registry")]
    PackageNotFound {
        /// Package name.
        name: String,
    },

    /// Registry transport failure.
    #[error("registry unreachable: {0}")]
    RegistryUnreachable(String),

    /// Unparsable lock file.
    #[error("corrupt lock file at {path}: {message} (delete it to re-resolve)")]
    CorruptLock {
        /// Lock file path.
        path: PathBuf,
        /// Parse failure detail.
        message: String,
    },

    /// Tarball digest does not match the recorded shasum.
    #[error("shasum mismatch for '{name}': expected {expected}, got {actual}")]
    DigestMismatch {
        /// Package name.
        name: String,
        /// Expected hex digest.
        expected: String,
        /// Actual hex digest.
        actual: String,
    },

    /// Invalid project manifest.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Archive extraction failure.
    #[error("archive error: {0}")]
    Archive(String),

    /// JSON error.
    #[error("json error: {0}")]
    Json(#[from] sonic_rs::Error),

    /// YAML error.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error.
    #[error("io error at {path}: {message}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Error message.
        message: String,
    },
}

impl Error {
    /// Create an IO error with context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Create a `BadVersion` error.
    #[must_use]
    pub fn bad_version(literal: impl Into<String>) -> Self {
        Self::BadVersion {
            literal: literal.into(),
        }
    }

    /// Create a `BadRange` error.
    #[must_use]
    pub fn bad_range(literal: impl Into<String>) -> Self {
        Self::BadRange {
            literal: literal.into(),
        }
    }
}

/// Result type for Bero operations.
pub type Result<T> = std::result::Result<T, Error>;
