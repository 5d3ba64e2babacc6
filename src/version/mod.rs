// src/version/mod.rs

//! Version handling and range matching for add-on packages
//!
//! A version is a release identifier (`1.2.0`, `5.4.2-HF01`) with an
//! optional `-SNAPSHOT` marker for development builds. Ranges are inclusive
//! on both ends, and dependency edges pair a package name with a range.
//!
//! String forms:
//! - Version: `1.2.0`, `1.2.0-SNAPSHOT`
//! - Range: `min:max`, `min`, `:max` or empty (any version)
//! - Dependency: `name`, `name:min`, `name:min:max`, `name::max`

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

const SNAPSHOT_SUFFIX: &str = "-SNAPSHOT";

/// A parsed package version
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    release: String,
    snapshot: bool,
}

impl Version {
    /// Parse a version string
    ///
    /// Format: release[-SNAPSHOT]
    /// Examples:
    /// - "1.2.3" → release="1.2.3", snapshot=false
    /// - "1.2.3-SNAPSHOT" → release="1.2.3", snapshot=true
    /// - "5.4.2-HF01" → release="5.4.2-HF01", snapshot=false
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::MalformedVersion("empty version string".to_string()));
        }

        let (release, snapshot) = match s.len().checked_sub(SNAPSHOT_SUFFIX.len()) {
            Some(split)
                if s.is_char_boundary(split)
                    && s[split..].eq_ignore_ascii_case(SNAPSHOT_SUFFIX) =>
            {
                (&s[..split], true)
            }
            _ => (s, false),
        };

        if release.is_empty() {
            return Err(Error::MalformedVersion(format!(
                "Missing release identifier in '{}'",
                s
            )));
        }
        if !release.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(Error::MalformedVersion(format!(
                "Release identifier must start with a digit: '{}'",
                s
            )));
        }
        if release.chars().any(|c| c.is_whitespace() || c == ':') {
            return Err(Error::MalformedVersion(format!(
                "Invalid character in version '{}'",
                s
            )));
        }

        Ok(Self {
            release: release.to_string(),
            snapshot,
        })
    }

    /// The release identifier, without any SNAPSHOT marker
    pub fn release(&self) -> &str {
        &self.release
    }

    /// Whether this is a pre-release (development) build
    pub fn is_snapshot(&self) -> bool {
        self.snapshot
    }

    /// The same release without the SNAPSHOT marker
    pub fn to_release(&self) -> Self {
        Self {
            release: self.release.clone(),
            snapshot: false,
        }
    }

    /// Leading dotted-numeric components, plus whatever follows them
    fn split_numeric(&self) -> (Vec<u64>, &str) {
        let mut numbers = Vec::new();
        let mut rest = self.release.as_str();
        loop {
            let end = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            if end == 0 {
                break;
            }
            match rest[..end].parse::<u64>() {
                Ok(n) => numbers.push(n),
                Err(_) => break,
            }
            rest = &rest[end..];
            match rest.strip_prefix('.') {
                Some(next) if next.starts_with(|c: char| c.is_ascii_digit()) => rest = next,
                _ => break,
            }
        }
        (numbers, rest)
    }

    /// Normalize the numeric prefix to a semver::Version for comparison
    ///
    /// Missing minor/patch components default to zero.
    fn to_semver(numbers: &[u64]) -> semver::Version {
        let major = numbers.first().copied().unwrap_or(0);
        let minor = numbers.get(1).copied().unwrap_or(0);
        let patch = numbers.get(2).copied().unwrap_or(0);
        semver::Version::new(major, minor, patch)
    }

    /// Compare two versions
    pub fn compare(&self, other: &Version) -> Ordering {
        let (nums_a, classifier_a) = self.split_numeric();
        let (nums_b, classifier_b) = other.split_numeric();

        match Self::to_semver(&nums_a).cmp(&Self::to_semver(&nums_b)) {
            Ordering::Equal => {}
            ord => return ord,
        }

        // Components past major.minor.patch (1.2.3.4)
        let extra = nums_a.len().max(nums_b.len());
        for i in 3..extra {
            let a = nums_a.get(i).copied().unwrap_or(0);
            let b = nums_b.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }

        // A classifier (-HF01, -rc1) sorts above the bare release
        match (classifier_a.is_empty(), classifier_b.is_empty()) {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => match classifier_a.cmp(classifier_b) {
                Ordering::Equal => {}
                ord => return ord,
            },
        }

        // SNAPSHOT of a release sorts below the release itself
        match (self.snapshot, other.snapshot) {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }

        // Keep Ord consistent with Eq ("1.0" vs "1.0.0")
        self.release.cmp(&other.release)
    }

    /// Strictly greater than
    pub fn greater_than(&self, other: &Version) -> bool {
        self.compare(other) == Ordering::Greater
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.release)?;
        if self.snapshot {
            write!(f, "{}", SNAPSHOT_SUFFIX)?;
        }
        Ok(())
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Version::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Inclusive version range; a missing bound is open
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VersionRange {
    pub min: Option<Version>,
    pub max: Option<Version>,
}

impl VersionRange {
    /// A range matching every version
    pub fn any() -> Self {
        Self::default()
    }

    /// A range matching exactly one version
    pub fn exact(version: Version) -> Self {
        Self {
            min: Some(version.clone()),
            max: Some(version),
        }
    }

    pub fn new(min: Option<Version>, max: Option<Version>) -> Self {
        Self { min, max }
    }

    /// Parse `min:max`, `min`, `:max` or an empty string
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (min, max) = match s.split_once(':') {
            Some((min, max)) => (min.trim(), max.trim()),
            None => (s, ""),
        };
        let parse_bound = |b: &str| -> Result<Option<Version>> {
            if b.is_empty() {
                Ok(None)
            } else {
                Version::parse(b).map(Some)
            }
        };
        Ok(Self {
            min: parse_bound(min)?,
            max: parse_bound(max)?,
        })
    }

    /// Check if a version lies within this range
    pub fn matches(&self, version: &Version) -> bool {
        self.min.as_ref().is_none_or(|min| version >= min)
            && self.max.as_ref().is_none_or(|max| version <= max)
    }

    /// True when neither bound is set
    pub fn is_any(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// True when either bound is a SNAPSHOT version
    pub fn is_snapshot_bounded(&self) -> bool {
        self.min.as_ref().is_some_and(Version::is_snapshot)
            || self.max.as_ref().is_some_and(Version::is_snapshot)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.min, &self.max) {
            (None, None) => Ok(()),
            (Some(min), None) => write!(f, "{}", min),
            (None, Some(max)) => write!(f, ":{}", max),
            (Some(min), Some(max)) => write!(f, "{}:{}", min, max),
        }
    }
}

/// A named edge: dependency, conflict, or provided capability
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageDependency {
    pub name: String,
    pub range: VersionRange,
}

impl PackageDependency {
    pub fn new(name: impl Into<String>, range: VersionRange) -> Self {
        Self {
            name: name.into(),
            range,
        }
    }

    /// Any version of the named package
    pub fn any(name: impl Into<String>) -> Self {
        Self::new(name, VersionRange::any())
    }

    /// Parse `name`, `name:min`, `name:min:max` or `name::max`
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (name, range) = match s.split_once(':') {
            Some((name, range)) => (name.trim(), range),
            None => (s, ""),
        };
        if name.is_empty() {
            return Err(Error::MalformedDependency(format!(
                "Missing package name in '{}'",
                s
            )));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(Error::MalformedDependency(format!(
                "Invalid package name in '{}'",
                s
            )));
        }
        if range.matches(':').count() > 1 {
            return Err(Error::MalformedDependency(format!(
                "Too many range separators in '{}'",
                s
            )));
        }
        let range = VersionRange::parse(range)
            .map_err(|e| Error::MalformedDependency(format!("'{}': {}", s, e)))?;
        Ok(Self::new(name, range))
    }

    /// Whether this edge carries a SNAPSHOT bound
    pub fn is_snapshot_bounded(&self) -> bool {
        self.range.is_snapshot_bounded()
    }
}

impl fmt::Display for PackageDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.range.is_any() {
            write!(f, ":{}", self.range)?;
        }
        Ok(())
    }
}

impl FromStr for PackageDependency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for PackageDependency {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PackageDependency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PackageDependency::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_version_parse_release() {
        let version = v("1.2.3");
        assert_eq!(version.release(), "1.2.3");
        assert!(!version.is_snapshot());
    }

    #[test]
    fn test_version_parse_snapshot() {
        let version = v("1.2.3-SNAPSHOT");
        assert_eq!(version.release(), "1.2.3");
        assert!(version.is_snapshot());
        assert!(v("1.2.3-snapshot").is_snapshot());
    }

    #[test]
    fn test_version_parse_malformed() {
        for bad in ["", "   ", "-SNAPSHOT", "abc", "1.0 beta", "1:2"] {
            assert!(
                matches!(Version::parse(bad), Err(Error::MalformedVersion(_))),
                "expected failure for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_version_compare_numeric() {
        assert!(v("1.2.3") < v("1.2.4"));
        assert!(v("1.10.0") > v("1.9.0"));
        assert!(v("2") > v("1.9.9"));
        assert!(v("1.2.3.4") > v("1.2.3"));
    }

    #[test]
    fn test_snapshot_below_release() {
        assert!(v("1.0.0-SNAPSHOT") < v("1.0.0"));
        assert!(v("1.0.0-SNAPSHOT") > v("0.9.0"));
        assert!(v("1.0.1-SNAPSHOT") > v("1.0.0"));
    }

    #[test]
    fn test_classifier_above_release() {
        assert!(v("5.4.2-HF01") > v("5.4.2"));
        assert!(v("5.4.2-HF02") > v("5.4.2-HF01"));
        assert!(v("5.4.2-HF01") < v("5.4.3"));
    }

    #[test]
    fn test_compare_is_antisymmetric() {
        let versions = [
            "1.0", "1.0.0", "1.0.0-SNAPSHOT", "1.0.1", "1.0.0-HF01", "2.0", "1.0.0.1",
        ];
        for a in versions {
            for b in versions {
                assert_eq!(v(a).compare(&v(b)), v(b).compare(&v(a)).reverse(), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn test_ord_consistent_with_eq() {
        assert_ne!(v("1.0"), v("1.0.0"));
        assert_ne!(v("1.0").cmp(&v("1.0.0")), Ordering::Equal);
        assert_eq!(v("1.0.0").cmp(&v("1.0.0")), Ordering::Equal);
    }

    #[test]
    fn test_version_display_roundtrip() {
        assert_eq!(v("1.2.3").to_string(), "1.2.3");
        assert_eq!(v("1.2.3-snapshot").to_string(), "1.2.3-SNAPSHOT");
    }

    #[test]
    fn test_range_matches() {
        let range = VersionRange::parse("1.0:2.0").unwrap();
        assert!(range.matches(&v("1.0")));
        assert!(range.matches(&v("1.5")));
        assert!(range.matches(&v("2.0")));
        assert!(!range.matches(&v("2.0.1")));
        assert!(!range.matches(&v("0.9")));

        let open = VersionRange::parse(":2.0").unwrap();
        assert!(open.min.is_none());
        assert!(open.matches(&v("0.1")));
        assert!(VersionRange::any().matches(&v("99.0")));
    }

    #[test]
    fn test_range_snapshot_bounded() {
        assert!(VersionRange::parse("1.0-SNAPSHOT").unwrap().is_snapshot_bounded());
        assert!(VersionRange::parse(":2.0-SNAPSHOT").unwrap().is_snapshot_bounded());
        assert!(!VersionRange::parse("1.0:2.0").unwrap().is_snapshot_bounded());
    }

    #[test]
    fn test_dependency_parse() {
        let dep = PackageDependency::parse("foo").unwrap();
        assert_eq!(dep.name, "foo");
        assert!(dep.range.is_any());

        let dep = PackageDependency::parse("foo:1.0:2.0").unwrap();
        assert_eq!(dep.range.min, Some(v("1.0")));
        assert_eq!(dep.range.max, Some(v("2.0")));
        assert_eq!(dep.to_string(), "foo:1.0:2.0");

        let dep = PackageDependency::parse("foo::2.0").unwrap();
        assert!(dep.range.min.is_none());
        assert_eq!(dep.to_string(), "foo::2.0");
    }

    #[test]
    fn test_dependency_parse_malformed() {
        assert!(matches!(
            PackageDependency::parse(":1.0"),
            Err(Error::MalformedDependency(_))
        ));
        assert!(matches!(
            PackageDependency::parse("foo:1.0:2.0:3.0"),
            Err(Error::MalformedDependency(_))
        ));
        assert!(matches!(
            PackageDependency::parse("foo:bar"),
            Err(Error::MalformedDependency(_))
        ));
    }

    #[test]
    fn test_serde_as_strings() {
        let dep: PackageDependency = serde_json::from_str("\"foo:1.0-SNAPSHOT\"").unwrap();
        assert!(dep.is_snapshot_bounded());
        assert_eq!(serde_json::to_string(&dep).unwrap(), "\"foo:1.0-SNAPSHOT\"");

        let version: Version = serde_json::from_str("\"2.1\"").unwrap();
        assert_eq!(version, v("2.1"));
        assert!(serde_json::from_str::<Version>("\"x\"").is_err());
    }
}
