// tests/common/mod.rs

//! Shared fixtures for integration tests.

#![allow(dead_code)]

use addonpm::catalog::MemorySource;
use addonpm::{
    Catalog, CatalogSnapshot, Package, PackageDependency, PackageRequest, ResolutionPlan,
    ResolveOptions, ResolveRequest, Resolver, Result, Version,
};
use std::sync::Arc;
use tempfile::TempDir;

/// A remote package with no edges
pub fn pkg(name: &str, version: &str) -> Package {
    Package::new(name, Version::parse(version).unwrap())
}

/// An installed, locally present package
pub fn installed(name: &str, version: &str) -> Package {
    pkg(name, version).installed()
}

pub fn dep(s: &str) -> PackageDependency {
    PackageDependency::parse(s).unwrap()
}

pub fn by_name(s: &str) -> PackageRequest {
    PackageRequest::ByNameRange(dep(s))
}

/// A catalog with one local and one remote in-memory source
pub fn catalog(local: Vec<Package>, remote: Vec<Package>) -> Catalog {
    let mut catalog = Catalog::new();
    catalog.register_source(Arc::new(MemorySource::new("installed", local)), true);
    catalog.register_source(Arc::new(MemorySource::new("marketplace", remote)), false);
    catalog
}

pub fn snapshot(local: Vec<Package>, remote: Vec<Package>) -> Arc<CatalogSnapshot> {
    catalog(local, remote).snapshot().unwrap()
}

/// Resolve against the resolvo oracle
pub fn resolve(
    local: Vec<Package>,
    remote: Vec<Package>,
    request: ResolveRequest,
    options: ResolveOptions,
) -> Result<ResolutionPlan> {
    Resolver::new(snapshot(local, remote), options).resolve(&request)
}

pub fn ids<'a>(packages: impl IntoIterator<Item = &'a addonpm::resolver::PlannedPackage>) -> Vec<String> {
    packages.into_iter().map(|p| p.id()).collect()
}

pub fn removal_ids(plan: &ResolutionPlan) -> Vec<String> {
    plan.remove().iter().map(|r| r.id()).collect()
}

/// Write JSON catalogs and a config referencing them into a temp dir
///
/// Returns (TempDir, config path) - keep the TempDir alive to prevent cleanup.
pub fn write_config(installed_json: &str, remote_json: &str, extra: &str) -> (TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("installed.json"), installed_json).unwrap();
    std::fs::write(dir.path().join("remote.json"), remote_json).unwrap();

    let config = format!(
        r#"{extra}

[[source]]
name = "installed"
path = "installed.json"
kind = "local"

[[source]]
name = "marketplace"
path = "remote.json"
kind = "remote"
"#
    );
    let config_path = dir.path().join("addonpm.toml");
    std::fs::write(&config_path, config).unwrap();
    (dir, config_path)
}
