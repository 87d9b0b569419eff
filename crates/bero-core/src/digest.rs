//! SHA-1 shasum handling for registry tarballs.

use sha1::{Digest, Sha1};
use std::fmt;
use std::io::Read;

/// A SHA-1 content digest (20 bytes), the `shasum` recorded by the registry
/// for every tarball.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shasum([u8; 20]);

impl Shasum {
    /// Hash bytes.
    #[must_use]
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Hash from a reader.
    ///
    /// # Errors
    /// Returns IO error if reading fails.
    pub fn from_reader<R: Read>(mut reader: R) -> std::io::Result<Self> {
        let mut hasher = Sha1::new();
        let mut buf = [0u8; 16384];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hasher.finalize().into()))
    }

    /// Hash a file.
    ///
    /// # Errors
    /// Returns IO error if the file cannot be read.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Parse from a 40-character hex string.
    #[must_use]
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 20] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Convert to lowercase hex.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short display (8 chars).
    #[must_use]
    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

/// Incremental shasum hasher for streaming downloads.
#[derive(Default)]
pub struct ShasumHasher {
    inner: Sha1,
}

impl ShasumHasher {
    /// Create new hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Update with data.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalize the digest.
    #[must_use]
    pub fn finalize(self) -> Shasum {
        Shasum(self.inner.finalize().into())
    }
}

impl fmt::Debug for Shasum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shasum({})", self.short())
    }
}

impl fmt::Display for Shasum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ShasumHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShasumHasher").finish_non_exhaustive()
    }
}
