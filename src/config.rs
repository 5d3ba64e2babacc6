// src/config.rs

//! Resolver configuration file
//!
//! A TOML file naming the package sources and the resolution knobs:
//!
//! ```toml
//! target_platform = "server-10.10"
//! allow_snapshot = false
//! keep_installed = true
//! timeout_secs = 30
//!
//! [[source]]
//! name = "installed"
//! path = "installed.json"
//! kind = "local"
//! ```
//!
//! Relative source paths are resolved against the directory holding the
//! configuration file when it is loaded with `ResolverConfig::load`.

use crate::catalog::{Catalog, DownloadingSource, JsonFileSource, PackageSource};
use crate::resolver::ResolveOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur when loading a resolver configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Where a source's packages come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Installed packages
    Local,
    /// A remote catalog
    Remote,
    /// Downloads in progress
    Downloading,
}

impl SourceKind {
    pub fn as_str(&self) -> &str {
        match self {
            SourceKind::Local => "local",
            SourceKind::Remote => "remote",
            SourceKind::Downloading => "downloading",
        }
    }

    /// Whether the catalog treats this source as local
    pub fn is_local(&self) -> bool {
        !matches!(self, SourceKind::Remote)
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(SourceKind::Local),
            "remote" => Ok(SourceKind::Remote),
            "downloading" => Ok(SourceKind::Downloading),
            _ => Err(format!("Unknown source kind: {}", s)),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `[[source]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub name: String,
    /// JSON catalog file
    pub path: PathBuf,
    pub kind: SourceKind,
}

/// Top-level resolver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    #[serde(default)]
    pub target_platform: Option<String>,

    #[serde(default)]
    pub allow_snapshot: bool,

    #[serde(default = "default_keep_installed")]
    pub keep_installed: bool,

    /// Solver deadline in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default, rename = "source")]
    pub sources: Vec<SourceConfig>,
}

fn default_keep_installed() -> bool {
    true
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            target_platform: None,
            allow_snapshot: false,
            keep_installed: default_keep_installed(),
            timeout_secs: None,
            sources: Vec::new(),
        }
    }
}

impl ResolverConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;

        if let Some(base) = path.parent() {
            for source in &mut config.sources {
                if source.path.is_relative() {
                    source.path = base.join(&source.path);
                }
            }
        }

        debug!(
            "Loaded config {} with {} sources",
            path.display(),
            config.sources.len()
        );
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: ResolverConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let mut names = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(ConfigError::Invalid("source name must not be empty".to_string()));
            }
            if !names.insert(source.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate source name '{}'",
                    source.name
                )));
            }
            if source.path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "source '{}' has an empty path",
                    source.name
                )));
            }
        }

        if self.timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolution options described by this configuration
    pub fn options(&self) -> ResolveOptions {
        ResolveOptions {
            target_platform: self.target_platform.clone(),
            allow_snapshot: self.allow_snapshot,
            keep_installed: self.keep_installed,
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }

    /// Build a catalog with every source registered in file order
    ///
    /// A downloading source is seeded with the packages listed in its file.
    pub fn build_catalog(&self) -> crate::Result<Catalog> {
        let mut catalog = Catalog::new();

        for source in &self.sources {
            let json = JsonFileSource::new(source.name.clone(), &source.path);
            let registered: Arc<dyn PackageSource> = match source.kind {
                SourceKind::Local | SourceKind::Remote => Arc::new(json),
                SourceKind::Downloading => {
                    let downloads = DownloadingSource::new(source.name.clone());
                    for pkg in json.list_packages()? {
                        downloads.begin(pkg);
                    }
                    Arc::new(downloads)
                }
            };
            catalog.register_source(registered, source.kind.is_local());
        }

        Ok(catalog)
    }
}
