// src/catalog/source.rs

//! Package sources
//!
//! A source produces the packages it currently knows about. Sources that
//! read from disk cache their listing until `flush_cache` is called.

use crate::error::{Error, Result};
use crate::package::{Package, PackageState, PackageType};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Something that can list packages
pub trait PackageSource: Send + Sync {
    /// Unique source name; the catalog ignores a second source of the same name
    fn name(&self) -> &str;

    /// Every package this source knows about
    fn list_packages(&self) -> Result<Vec<Package>>;

    /// Packages of a single type
    fn list_packages_of_type(&self, package_type: PackageType) -> Result<Vec<Package>> {
        Ok(self
            .list_packages()?
            .into_iter()
            .filter(|p| p.package_type == package_type)
            .collect())
    }

    /// Drop any cached listing
    fn flush_cache(&self) {}
}

/// A fixed, in-memory package list
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    packages: Vec<Package>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, packages: Vec<Package>) -> Self {
        Self {
            name: name.into(),
            packages,
        }
    }
}

impl PackageSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_packages(&self) -> Result<Vec<Package>> {
        Ok(self.packages.clone())
    }
}

/// A JSON file holding an array of packages, loaded on first use
#[derive(Debug)]
pub struct JsonFileSource {
    name: String,
    path: PathBuf,
    cache: RwLock<Option<Arc<Vec<Package>>>>,
}

impl JsonFileSource {
    pub fn new(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            path: path.as_ref().to_path_buf(),
            cache: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Arc<Vec<Package>>> {
        if let Some(cached) = self.cache.read().as_ref() {
            return Ok(Arc::clone(cached));
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::Source(format!(
                "{}: failed to read {}: {}",
                self.name,
                self.path.display(),
                e
            ))
        })?;
        let packages: Vec<Package> = serde_json::from_str(&content).map_err(|e| {
            Error::Source(format!(
                "{}: invalid catalog {}: {}",
                self.name,
                self.path.display(),
                e
            ))
        })?;
        debug!(
            "Loaded {} packages from source '{}' ({})",
            packages.len(),
            self.name,
            self.path.display()
        );

        let packages = Arc::new(packages);
        *self.cache.write() = Some(Arc::clone(&packages));
        Ok(packages)
    }
}

impl PackageSource for JsonFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_packages(&self) -> Result<Vec<Package>> {
        Ok(self.load()?.as_ref().clone())
    }

    fn flush_cache(&self) {
        *self.cache.write() = None;
    }
}

/// Packages whose download is in progress
///
/// Listed packages always report the `downloading` state and are not local.
#[derive(Debug, Default)]
pub struct DownloadingSource {
    name: String,
    in_flight: RwLock<Vec<Package>>,
}

impl DownloadingSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            in_flight: RwLock::new(Vec::new()),
        }
    }

    /// Start tracking a download; returns false if it is already tracked
    pub fn begin(&self, package: Package) -> bool {
        let mut in_flight = self.in_flight.write();
        let id = package.id();
        if in_flight.iter().any(|p| p.id() == id) {
            return false;
        }
        in_flight.push(package.with_state(PackageState::Downloading).with_local(false));
        true
    }

    /// Stop tracking a download, returning the package as downloaded
    pub fn finish(&self, id: &str) -> Option<Package> {
        let mut in_flight = self.in_flight.write();
        let pos = in_flight.iter().position(|p| p.id() == id)?;
        let package = in_flight.remove(pos);
        Some(package.with_state(PackageState::Downloaded).with_local(true))
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.read().is_empty()
    }
}

impl PackageSource for DownloadingSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_packages(&self) -> Result<Vec<Package>> {
        Ok(self.in_flight.read().clone())
    }
}
