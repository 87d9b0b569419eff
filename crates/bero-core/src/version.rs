//! Version range handling (npm-compatible).

use crate::error::{Error, Result};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Parse a version literal.
///
/// Tolerates a leading `v` prefix.
///
/// # Errors
/// Returns [`Error::BadVersion`] if the literal is not a semantic version.
pub fn parse_version(s: &str) -> Result<Version> {
    let trimmed = s.trim().trim_start_matches('v');
    Version::parse(trimmed).map_err(|_| Error::bad_version(s))
}

/// An npm-style version range.
///
/// The raw request string is kept verbatim (it becomes part of lock keys),
/// alongside a normalized `semver` requirement validated at parse time. The
/// empty range matches every version, pre-releases included.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRange {
    raw: String,
    req: Option<VersionReq>,
}

impl VersionRange {
    /// Parse a range literal.
    ///
    /// Supported forms: caret (`^1.2.3`), tilde (`~1.2`), comparator sets
    /// (`>=1.0.0 <2.0.0`, space- or comma-joined), exact versions,
    /// wildcards (`*`, `1.x`, `1.2.*`), and the empty string.
    ///
    /// # Errors
    /// Returns [`Error::BadRange`] if the literal cannot be normalized into
    /// a semver requirement.
    pub fn parse(s: impl Into<String>) -> Result<Self> {
        let raw = s.into();
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Ok(Self { raw, req: None });
        }

        let normalized = normalize_range(trimmed);
        let req = VersionReq::parse(&normalized).map_err(|_| Error::bad_range(&raw))?;
        Ok(Self {
            raw,
            req: Some(req),
        })
    }

    /// The empty range: matches any version.
    #[must_use]
    pub fn any() -> Self {
        Self {
            raw: String::new(),
            req: None,
        }
    }

    /// Exact range for a concrete version.
    #[must_use]
    pub fn exact(version: &Version) -> Self {
        Self {
            raw: version.to_string(),
            req: VersionReq::parse(&format!("={version}")).ok(),
        }
    }

    /// The compatible-with range `^MAJOR.MINOR.PATCH`, used to pin a root
    /// dependency that was originally requested without a range.
    #[must_use]
    pub fn caret(version: &Version) -> Self {
        let raw = format!("^{}.{}.{}", version.major, version.minor, version.patch);
        let req = VersionReq::parse(&raw).ok();
        Self { raw, req }
    }

    /// Get the raw range string as originally requested.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this is the empty (unconstrained) range.
    #[must_use]
    pub fn is_any(&self) -> bool {
        self.req.is_none()
    }

    /// Check if a version satisfies the range.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        match &self.req {
            Some(req) => req.matches(version),
            None => true,
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for VersionRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VersionRange {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<VersionRange> for String {
    fn from(range: VersionRange) -> Self {
        range.raw
    }
}

/// Pick the highest version satisfying the range.
///
/// The empty range returns the highest version unconditionally. `versions`
/// is expected in ascending enumeration order; ties resolve to the later
/// entry.
pub fn max_satisfying<'a, I>(versions: I, range: &VersionRange) -> Option<&'a Version>
where
    I: IntoIterator<Item = &'a Version>,
{
    versions.into_iter().filter(|v| range.matches(v)).max()
}

/// Normalize an npm range into `semver` requirement syntax.
fn normalize_range(s: &str) -> String {
    // Wildcards
    if s == "*" || s == "x" || s == "X" {
        return "*".to_string();
    }

    // .* / .x wildcard patterns ("3.*", "1.2.x")
    let lower = s.to_ascii_lowercase();
    if lower.ends_with(".*") || lower.ends_with(".x") {
        let prefix = &s[..s.len() - 2];
        let parts: Vec<&str> = prefix.split('.').collect();
        return match parts.len() {
            // "3.*" -> ">=3.0.0, <4.0.0"
            1 => format!(
                ">={}.0.0, <{}.0.0",
                parts[0],
                parts[0].parse::<u64>().map_or(0, |n| n + 1)
            ),
            // "3.1.*" -> ">=3.1.0, <3.2.0"
            2 => format!(
                ">={}.{}.0, <{}.{}.0",
                parts[0],
                parts[1],
                parts[0],
                parts[1].parse::<u64>().map_or(0, |n| n + 1)
            ),
            _ => s.to_string(),
        };
    }

    // Caret and tilde
    if let Some(rest) = s.strip_prefix('^') {
        return format!("^{}", normalize_version(rest));
    }
    if let Some(rest) = s.strip_prefix('~') {
        return format!("~{}", normalize_version(rest));
    }

    // Comma-joined AND
    if s.contains(',') {
        return s
            .split(',')
            .map(|p| normalize_range(p.trim()))
            .collect::<Vec<_>>()
            .join(", ");
    }

    // Space-joined comparator sets (">=1.0.0 <2.0.0")
    if s.contains(char::is_whitespace) {
        return s
            .split_whitespace()
            .map(normalize_range)
            .collect::<Vec<_>>()
            .join(", ");
    }

    // Explicit comparators pass through
    if s.starts_with(">=")
        || s.starts_with("<=")
        || s.starts_with('>')
        || s.starts_with('<')
        || s.starts_with('=')
    {
        return s.to_string();
    }

    // Bare version = exact match; semver treats a bare version as caret
    format!("={}", normalize_version(s))
}

/// Pad a version fragment to three components.
fn normalize_version(v: &str) -> String {
    let v = v.trim().trim_start_matches('v');
    let dots = v.chars().filter(|&c| c == '.').count();
    match dots {
        0 => format!("{v}.0.0"),
        1 => format!("{v}.0"),
        _ => v.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn empty_range_matches_everything() {
        let r = VersionRange::any();
        assert!(r.is_any());
        assert!(r.matches(&v("1.0.0")));
        assert!(r.matches(&v("99.99.99")));
        assert!(r.matches(&v("2.0.0-beta.1")));
    }

    #[test]
    fn caret() {
        let r = VersionRange::parse("^1.2.0").unwrap();
        assert!(r.matches(&v("1.2.0")));
        assert!(r.matches(&v("1.9.9")));
        assert!(!r.matches(&v("2.0.0")));
    }

    #[test]
    fn caret_short_form() {
        let r = VersionRange::parse("^1.2").unwrap();
        assert!(r.matches(&v("1.2.0")));
        assert!(!r.matches(&v("2.0.0")));
    }

    #[test]
    fn tilde() {
        let r = VersionRange::parse("~1.2.0").unwrap();
        assert!(r.matches(&v("1.2.9")));
        assert!(!r.matches(&v("1.3.0")));
    }

    #[test]
    fn comparator_set_space_joined() {
        let r = VersionRange::parse(">=1.0.0 <2.0.0").unwrap();
        assert!(r.matches(&v("1.0.0")));
        assert!(r.matches(&v("1.9.0")));
        assert!(!r.matches(&v("2.0.0")));
    }

    #[test]
    fn bare_version_is_exact() {
        let r = VersionRange::parse("1.2.3").unwrap();
        assert!(r.matches(&v("1.2.3")));
        assert!(!r.matches(&v("1.2.4")));
    }

    #[test]
    fn wildcards() {
        let r = VersionRange::parse("3.*").unwrap();
        assert!(r.matches(&v("3.0.0")));
        assert!(r.matches(&v("3.99.0")));
        assert!(!r.matches(&v("4.0.0")));

        let r = VersionRange::parse("3.1.x").unwrap();
        assert!(r.matches(&v("3.1.7")));
        assert!(!r.matches(&v("3.2.0")));
    }

    #[test]
    fn bad_range_is_fatal() {
        assert!(matches!(
            VersionRange::parse("not a range"),
            Err(Error::BadRange { .. })
        ));
    }

    #[test]
    fn bad_version_reports_literal() {
        let err = parse_version("1.2").unwrap_err();
        assert!(matches!(err, Error::BadVersion { literal } if literal == "1.2"));
    }

    #[test]
    fn prerelease_needs_same_triple() {
        let r = VersionRange::parse("^1.0.0").unwrap();
        assert!(!r.matches(&v("1.1.0-beta.1")));

        let r = VersionRange::parse("^1.1.0-beta.0").unwrap();
        assert!(r.matches(&v("1.1.0-beta.1")));
    }

    #[test]
    fn max_satisfying_picks_highest() {
        let versions = vec![v("1.0.0"), v("1.1.0"), v("2.0.0")];
        let r = VersionRange::parse("^1.0.0").unwrap();
        assert_eq!(max_satisfying(&versions, &r), Some(&v("1.1.0")));
    }

    #[test]
    fn max_satisfying_empty_range_is_plain_max() {
        let versions = vec![v("1.0.0"), v("3.2.1"), v("2.0.0")];
        assert_eq!(
            max_satisfying(&versions, &VersionRange::any()),
            Some(&v("3.2.1"))
        );
    }

    #[test]
    fn max_satisfying_none_when_no_match() {
        let versions = vec![v("1.0.0")];
        let r = VersionRange::parse("^2.0.0").unwrap();
        assert_eq!(max_satisfying(&versions, &r), None);
    }

    #[test]
    fn caret_of_version() {
        let r = VersionRange::caret(&v("3.2.1"));
        assert_eq!(r.as_str(), "^3.2.1");
        assert!(r.matches(&v("3.9.0")));
        assert!(!r.matches(&v("4.0.0")));
    }

    #[test]
    fn raw_string_round_trips() {
        let r = VersionRange::parse(">=1.0.0 <2.0.0").unwrap();
        assert_eq!(r.to_string(), ">=1.0.0 <2.0.0");
        assert_eq!(String::from(r), ">=1.0.0 <2.0.0");
    }
}
