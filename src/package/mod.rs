// src/package/mod.rs

//! Package descriptors
//!
//! A `Package` is an immutable description of one version of one add-on,
//! as reported by a package source. Identity is `name-version`.

use crate::version::{PackageDependency, Version};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of add-on package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    #[default]
    Addon,
    Hotfix,
    /// Development tooling; SNAPSHOT builds are always admitted
    Studio,
    Bundle,
}

impl PackageType {
    pub fn as_str(&self) -> &str {
        match self {
            PackageType::Addon => "addon",
            PackageType::Hotfix => "hotfix",
            PackageType::Studio => "studio",
            PackageType::Bundle => "bundle",
        }
    }
}

impl FromStr for PackageType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "addon" => Ok(PackageType::Addon),
            "hotfix" => Ok(PackageType::Hotfix),
            "studio" => Ok(PackageType::Studio),
            "bundle" => Ok(PackageType::Bundle),
            _ => Err(format!("Invalid package type: {s}")),
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a package sits in its lifecycle on this instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageState {
    #[default]
    Remote,
    Downloading,
    Downloaded,
    Installed,
}

impl PackageState {
    pub fn as_str(&self) -> &str {
        match self {
            PackageState::Remote => "remote",
            PackageState::Downloading => "downloading",
            PackageState::Downloaded => "downloaded",
            PackageState::Installed => "installed",
        }
    }

    pub fn is_installed(&self) -> bool {
        matches!(self, PackageState::Installed)
    }
}

impl FromStr for PackageState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "remote" => Ok(PackageState::Remote),
            "downloading" => Ok(PackageState::Downloading),
            "downloaded" => Ok(PackageState::Downloaded),
            "installed" => Ok(PackageState::Installed),
            _ => Err(format!("Invalid package state: {s}")),
        }
    }
}

impl fmt::Display for PackageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One version of one add-on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: Version,
    #[serde(rename = "type", default)]
    pub package_type: PackageType,
    #[serde(default)]
    pub state: PackageState,
    /// Package data is present on this instance
    #[serde(default)]
    pub local: bool,
    /// Empty means every platform
    #[serde(default)]
    pub target_platforms: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<PackageDependency>,
    #[serde(default)]
    pub conflicts: Vec<PackageDependency>,
    #[serde(default)]
    pub provides: Vec<PackageDependency>,
}

impl Package {
    /// Create a remote add-on with no edges
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            package_type: PackageType::default(),
            state: PackageState::default(),
            local: false,
            target_platforms: Vec::new(),
            dependencies: Vec::new(),
            conflicts: Vec::new(),
            provides: Vec::new(),
        }
    }

    /// Unique identifier: `name-version`
    pub fn id(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    pub fn is_installed(&self) -> bool {
        self.state.is_installed()
    }

    pub fn is_snapshot(&self) -> bool {
        self.version.is_snapshot()
    }

    /// Check whether this package may run on the given platform
    ///
    /// A declared platform is compatible when the configured platform starts
    /// with it, so `server-10` covers `server-10.10`.
    pub fn is_compatible_with(&self, platform: &str) -> bool {
        self.target_platforms.is_empty()
            || self
                .target_platforms
                .iter()
                .any(|declared| platform.starts_with(declared.as_str()))
    }

    pub fn with_type(mut self, package_type: PackageType) -> Self {
        self.package_type = package_type;
        self
    }

    pub fn with_state(mut self, state: PackageState) -> Self {
        self.state = state;
        self
    }

    /// Mark as installed and locally present
    pub fn installed(mut self) -> Self {
        self.state = PackageState::Installed;
        self.local = true;
        self
    }

    pub fn with_local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    pub fn with_platforms<I, S>(mut self, platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_platforms = platforms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dependency(mut self, dep: PackageDependency) -> Self {
        self.dependencies.push(dep);
        self
    }

    pub fn with_conflict(mut self, conflict: PackageDependency) -> Self {
        self.conflicts.push(conflict);
        self
    }

    pub fn with_provides(mut self, provided: PackageDependency) -> Self {
        self.provides.push(provided);
        self
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(name: &str, version: &str) -> Package {
        Package::new(name, Version::parse(version).unwrap())
    }

    #[test]
    fn test_package_id() {
        assert_eq!(pkg("foo", "1.0.0").id(), "foo-1.0.0");
        assert_eq!(pkg("foo", "1.0.0-SNAPSHOT").id(), "foo-1.0.0-SNAPSHOT");
    }

    #[test]
    fn test_platform_compatibility() {
        let any = pkg("foo", "1.0");
        assert!(any.is_compatible_with("server-10.10"));

        let pinned = pkg("foo", "1.0").with_platforms(["server-9", "server-10"]);
        assert!(pinned.is_compatible_with("server-10.10"));
        assert!(pinned.is_compatible_with("server-9.3"));
        assert!(!pinned.is_compatible_with("server-8.0"));
    }

    #[test]
    fn test_state_is_installed() {
        assert!(PackageState::Installed.is_installed());
        assert!(!PackageState::Downloaded.is_installed());
        assert!(pkg("foo", "1.0").installed().is_installed());
    }

    #[test]
    fn test_type_roundtrip() {
        for ty in [
            PackageType::Addon,
            PackageType::Hotfix,
            PackageType::Studio,
            PackageType::Bundle,
        ] {
            assert_eq!(ty.as_str().parse::<PackageType>().unwrap(), ty);
        }
        assert!("plugin".parse::<PackageType>().is_err());
    }

    #[test]
    fn test_deserialize_defaults() {
        let json = r#"{"name": "foo", "version": "1.0.0"}"#;
        let package: Package = serde_json::from_str(json).unwrap();
        assert_eq!(package.package_type, PackageType::Addon);
        assert_eq!(package.state, PackageState::Remote);
        assert!(!package.local);
        assert!(package.dependencies.is_empty());
    }

    #[test]
    fn test_deserialize_full() {
        let json = r#"{
            "name": "foo", "version": "2.0-SNAPSHOT", "type": "studio",
            "state": "installed", "local": true,
            "target_platforms": ["server-10"],
            "dependencies": ["bar:1.0", "baz"],
            "conflicts": ["old::0.9"],
            "provides": ["foo-api:2.0"]
        }"#;
        let package: Package = serde_json::from_str(json).unwrap();
        assert_eq!(package.package_type, PackageType::Studio);
        assert!(package.is_installed());
        assert!(package.is_snapshot());
        assert_eq!(package.dependencies.len(), 2);
        assert_eq!(package.conflicts[0].name, "old");
        assert_eq!(package.provides[0].to_string(), "foo-api:2.0");
    }
}
