// src/catalog/mod.rs

//! Package catalog
//!
//! The catalog aggregates local and remote package sources and derives
//! views over them. Nothing is cached except the `CatalogSnapshot` handed
//! to the resolver, which is built once and swapped out atomically when
//! the cache is flushed.
//!
//! Views come in two flavors:
//! - per-version views, deduplicated by package id
//! - merged views, reduced to the highest version of each name

mod source;

pub use source::{DownloadingSource, JsonFileSource, MemorySource, PackageSource};

use crate::error::Result;
use crate::package::{Package, PackageType};
use crate::resolver::graph::DependencyGraph;
use crate::resolver::ResolutionPlan;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Deduplicate packages by id, keeping first-seen order
///
/// A package whose id was already seen replaces the earlier entry in place.
pub fn dedupe_by_id(packages: impl IntoIterator<Item = Package>) -> Vec<Package> {
    let mut result: Vec<Package> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for pkg in packages {
        match index.get(&pkg.id()) {
            Some(&pos) => result[pos] = pkg,
            None => {
                index.insert(pkg.id(), result.len());
                result.push(pkg);
            }
        }
    }

    result
}

/// Reduce packages to the highest version of each name
///
/// Input is deduplicated by id first. Among packages of the same name, a
/// later one replaces the current pick only when its version is strictly
/// greater. Output keeps the order in which names were first seen.
pub fn merge_by_highest_version(packages: impl IntoIterator<Item = Package>) -> Vec<Package> {
    let mut result: Vec<Package> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for pkg in dedupe_by_id(packages) {
        match index.get(&pkg.name) {
            Some(&pos) => {
                if pkg.version.greater_than(&result[pos].version) {
                    result[pos] = pkg;
                }
            }
            None => {
                index.insert(pkg.name.clone(), result.len());
                result.push(pkg);
            }
        }
    }

    result
}

/// Immutable view of the catalog at one point in time
///
/// Every list holds every version known to its sources, deduplicated by id.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    all: Vec<Package>,
    local: Vec<Package>,
    remote: Vec<Package>,
}

impl CatalogSnapshot {
    /// Build a snapshot from already-listed packages
    ///
    /// `all` is remote followed by local, so a local copy of an id shadows
    /// the remote one.
    pub fn new(local: Vec<Package>, remote: Vec<Package>) -> Self {
        let local = dedupe_by_id(local);
        let remote = dedupe_by_id(remote);
        let all = dedupe_by_id(remote.iter().chain(local.iter()).cloned());
        Self { all, local, remote }
    }

    pub fn all(&self) -> &[Package] {
        &self.all
    }

    pub fn local(&self) -> &[Package] {
        &self.local
    }

    pub fn remote(&self) -> &[Package] {
        &self.remote
    }

    /// Packages in the installed state
    pub fn installed(&self) -> impl Iterator<Item = &Package> {
        self.all.iter().filter(|p| p.is_installed())
    }

    /// Look up any known package by id
    pub fn find(&self, id: &str) -> Option<&Package> {
        self.all.iter().find(|p| p.id() == id)
    }

    /// Look up a remote package by id
    pub fn find_remote(&self, id: &str) -> Option<&Package> {
        self.remote.iter().find(|p| p.id() == id)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.all.iter().any(|p| p.name == name)
    }

    /// Order the packages a plan installs so dependencies come first
    pub fn order(&self, plan: &ResolutionPlan) -> Vec<String> {
        let packages: Vec<&Package> = plan
            .all_to_install()
            .filter_map(|planned| {
                let id = planned.id();
                let found = self.find(&id);
                if found.is_none() {
                    debug!("Planned package {} is not in the catalog, ordering it last", id);
                }
                found
            })
            .collect();

        let mut order = DependencyGraph::from_packages(packages).install_order();
        for planned in plan.all_to_install() {
            let id = planned.id();
            if !order.contains(&id) {
                order.push(id);
            }
        }
        order
    }
}

struct RegisteredSource {
    source: Arc<dyn PackageSource>,
    local: bool,
}

/// Registry of package sources and the views derived from them
#[derive(Default)]
pub struct Catalog {
    sources: Vec<RegisteredSource>,
    cached: RwLock<Option<Arc<CatalogSnapshot>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source as local or remote
    ///
    /// Returns false, leaving the catalog unchanged, when a source of the
    /// same name is already registered.
    pub fn register_source(&mut self, source: Arc<dyn PackageSource>, local: bool) -> bool {
        if self.sources.iter().any(|s| s.source.name() == source.name()) {
            debug!("Source '{}' already registered, ignoring", source.name());
            return false;
        }
        debug!(
            "Registered {} source '{}'",
            if local { "local" } else { "remote" },
            source.name()
        );
        self.sources.push(RegisteredSource { source, local });
        *self.cached.get_mut() = None;
        true
    }

    /// Remove every source and drop the cached snapshot
    pub fn reset_sources(&mut self) {
        self.sources.clear();
        *self.cached.get_mut() = None;
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.source.name()).collect()
    }

    fn local_sources(&self) -> impl Iterator<Item = &Arc<dyn PackageSource>> {
        self.sources.iter().filter(|s| s.local).map(|s| &s.source)
    }

    fn remote_sources(&self) -> impl Iterator<Item = &Arc<dyn PackageSource>> {
        self.sources.iter().filter(|s| !s.local).map(|s| &s.source)
    }

    /// Remote sources followed by local ones
    fn all_sources(&self) -> impl Iterator<Item = &Arc<dyn PackageSource>> {
        self.remote_sources().chain(self.local_sources())
    }

    fn collect<'a>(
        sources: impl Iterator<Item = &'a Arc<dyn PackageSource>>,
        package_type: Option<PackageType>,
    ) -> Result<Vec<Package>> {
        let mut packages = Vec::new();
        for source in sources {
            match package_type {
                Some(ty) => packages.extend(source.list_packages_of_type(ty)?),
                None => packages.extend(source.list_packages()?),
            }
        }
        Ok(packages)
    }

    /// Highest version of every package, across all sources
    pub fn list_packages(&self) -> Result<Vec<Package>> {
        self.list_packages_of_type(None)
    }

    pub fn list_packages_of_type(&self, package_type: Option<PackageType>) -> Result<Vec<Package>> {
        Ok(merge_by_highest_version(Self::collect(
            self.all_sources(),
            package_type,
        )?))
    }

    /// Highest version of every locally known package
    pub fn list_local_packages(&self) -> Result<Vec<Package>> {
        self.list_local_packages_of_type(None)
    }

    pub fn list_local_packages_of_type(
        &self,
        package_type: Option<PackageType>,
    ) -> Result<Vec<Package>> {
        Ok(merge_by_highest_version(Self::collect(
            self.local_sources(),
            package_type,
        )?))
    }

    /// Highest version of every remotely available package
    pub fn list_remote_packages(&self) -> Result<Vec<Package>> {
        self.list_remote_packages_of_type(None)
    }

    pub fn list_remote_packages_of_type(
        &self,
        package_type: Option<PackageType>,
    ) -> Result<Vec<Package>> {
        Ok(merge_by_highest_version(Self::collect(
            self.remote_sources(),
            package_type,
        )?))
    }

    /// Every version of every package, deduplicated by id
    pub fn list_all_packages(&self) -> Result<Vec<Package>> {
        Ok(dedupe_by_id(Self::collect(self.all_sources(), None)?))
    }

    /// Every installed package
    pub fn list_installed_packages(&self) -> Result<Vec<Package>> {
        Ok(dedupe_by_id(Self::collect(self.local_sources(), None)?)
            .into_iter()
            .filter(|p| p.is_installed())
            .collect())
    }

    /// Remote packages that would update a local one
    pub fn list_update_candidates(&self) -> Result<Vec<Package>> {
        self.list_update_candidates_of_type(None)
    }

    /// Remote packages newer than a local package of the same name
    ///
    /// Remote hotfixes are always offered, whatever the queried type,
    /// unless already picked or already installed. Each one is put in
    /// front of the list, so they come out in reverse listing order.
    pub fn list_update_candidates_of_type(
        &self,
        package_type: Option<PackageType>,
    ) -> Result<Vec<Package>> {
        let local = self.list_local_packages_of_type(package_type)?;
        let remote = self.list_remote_packages_of_type(package_type)?;

        let mut updates: Vec<Package> = Vec::new();
        for pkg in &local {
            for candidate in remote.iter().filter(|r| r.name == pkg.name) {
                if candidate.version.greater_than(&pkg.version) {
                    updates.push(candidate.clone());
                }
            }
        }

        let installed: Vec<String> = self
            .list_installed_packages()?
            .iter()
            .map(Package::id)
            .collect();
        for hotfix in self.list_remote_packages_of_type(Some(PackageType::Hotfix))? {
            let id = hotfix.id();
            if installed.contains(&id) || updates.iter().any(|u| u.id() == id) {
                continue;
            }
            updates.insert(0, hotfix);
        }

        Ok(updates)
    }

    /// Remote packages with no local package of the same name
    pub fn list_only_remote_packages(&self) -> Result<Vec<Package>> {
        self.list_only_remote_packages_of_type(None)
    }

    pub fn list_only_remote_packages_of_type(
        &self,
        package_type: Option<PackageType>,
    ) -> Result<Vec<Package>> {
        let local = self.list_local_packages_of_type(package_type)?;
        Ok(self
            .list_remote_packages_of_type(package_type)?
            .into_iter()
            .filter(|r| !local.iter().any(|l| l.name == r.name))
            .collect())
    }

    /// Merged packages whose name is available remotely
    pub fn list_remote_or_local_packages(&self) -> Result<Vec<Package>> {
        self.list_remote_or_local_packages_of_type(None)
    }

    pub fn list_remote_or_local_packages_of_type(
        &self,
        package_type: Option<PackageType>,
    ) -> Result<Vec<Package>> {
        let remote = self.list_remote_packages_of_type(package_type)?;
        Ok(self
            .list_packages_of_type(package_type)?
            .into_iter()
            .filter(|p| remote.iter().any(|r| r.name == p.name))
            .collect())
    }

    /// Find a package by id
    ///
    /// Looks at the merged view first, then at every known version.
    pub fn get_package(&self, id: &str) -> Result<Option<Package>> {
        if let Some(pkg) = self.list_packages()?.into_iter().find(|p| p.id() == id) {
            return Ok(Some(pkg));
        }
        Ok(self.list_all_packages()?.into_iter().find(|p| p.id() == id))
    }

    pub fn get_local_package(&self, id: &str) -> Result<Option<Package>> {
        Ok(dedupe_by_id(Self::collect(self.local_sources(), None)?)
            .into_iter()
            .find(|p| p.id() == id))
    }

    pub fn get_remote_package(&self, id: &str) -> Result<Option<Package>> {
        Ok(dedupe_by_id(Self::collect(self.remote_sources(), None)?)
            .into_iter()
            .find(|p| p.id() == id))
    }

    /// Current snapshot, built on first use and reused until flushed
    pub fn snapshot(&self) -> Result<Arc<CatalogSnapshot>> {
        if let Some(snapshot) = self.cached.read().as_ref() {
            return Ok(Arc::clone(snapshot));
        }

        let mut cached = self.cached.write();
        // Another caller may have built it while we waited
        if let Some(snapshot) = cached.as_ref() {
            return Ok(Arc::clone(snapshot));
        }

        let snapshot = Arc::new(CatalogSnapshot::new(
            Self::collect(self.local_sources(), None)?,
            Self::collect(self.remote_sources(), None)?,
        ));
        debug!(
            "Built catalog snapshot: {} packages ({} local, {} remote)",
            snapshot.all().len(),
            snapshot.local().len(),
            snapshot.remote().len()
        );
        *cached = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Flush every source cache and drop the snapshot
    pub fn flush_cache(&self) {
        let mut cached = self.cached.write();
        for source in self.all_sources() {
            source.flush_cache();
        }
        *cached = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;

    fn pkg(name: &str, version: &str) -> Package {
        Package::new(name, Version::parse(version).unwrap())
    }

    fn catalog(local: Vec<Package>, remote: Vec<Package>) -> Catalog {
        let mut catalog = Catalog::new();
        catalog.register_source(Arc::new(MemorySource::new("local", local)), true);
        catalog.register_source(Arc::new(MemorySource::new("remote", remote)), false);
        catalog
    }

    #[test]
    fn test_merge_keeps_highest_version() {
        let merged = merge_by_highest_version(vec![
            pkg("a", "1.0"),
            pkg("b", "1.0"),
            pkg("a", "2.0"),
            pkg("a", "1.5"),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id(), "a-2.0");
        assert_eq!(merged[1].id(), "b-1.0");
    }

    #[test]
    fn test_dedupe_later_overwrites() {
        let packages = dedupe_by_id(vec![pkg("a", "1.0"), pkg("a", "1.0").installed()]);
        assert_eq!(packages.len(), 1);
        assert!(packages[0].is_installed());
    }

    #[test]
    fn test_register_source_dedupes_by_name() {
        let mut catalog = Catalog::new();
        assert!(catalog.register_source(Arc::new(MemorySource::new("s", vec![])), true));
        assert!(!catalog.register_source(Arc::new(MemorySource::new("s", vec![])), false));
        assert_eq!(catalog.source_names(), vec!["s"]);

        catalog.reset_sources();
        assert!(catalog.source_names().is_empty());
    }

    #[test]
    fn test_local_copy_shadows_remote() {
        let catalog = catalog(
            vec![pkg("a", "1.0").installed()],
            vec![pkg("a", "1.0"), pkg("b", "1.0")],
        );
        let all = catalog.list_all_packages().unwrap();
        assert_eq!(all.len(), 2);
        let a = all.iter().find(|p| p.name == "a").unwrap();
        assert!(a.is_installed());
    }

    #[test]
    fn test_update_candidates() {
        let catalog = catalog(
            vec![pkg("a", "1.0").installed(), pkg("b", "2.0").installed()],
            vec![
                pkg("a", "1.1"),
                pkg("b", "1.0"),
                pkg("hf", "1").with_type(PackageType::Hotfix),
            ],
        );
        let updates = catalog.list_update_candidates().unwrap();
        let ids: Vec<String> = updates.iter().map(Package::id).collect();
        assert_eq!(ids, vec!["hf-1", "a-1.1"]);

        let addons: Vec<String> = catalog
            .list_update_candidates_of_type(Some(PackageType::Addon))
            .unwrap()
            .iter()
            .map(Package::id)
            .collect();
        assert_eq!(addons, vec!["hf-1", "a-1.1"]);
    }

    #[test]
    fn test_hotfixes_prepended_in_reverse_listing_order() {
        let catalog = catalog(
            vec![],
            vec![
                pkg("hf-a", "1").with_type(PackageType::Hotfix),
                pkg("hf-b", "1").with_type(PackageType::Hotfix),
            ],
        );
        let ids: Vec<String> = catalog
            .list_update_candidates()
            .unwrap()
            .iter()
            .map(Package::id)
            .collect();
        assert_eq!(ids, vec!["hf-b-1", "hf-a-1"]);
    }

    #[test]
    fn test_installed_hotfix_not_offered() {
        let hotfix = pkg("hf", "1").with_type(PackageType::Hotfix);
        let catalog = catalog(vec![hotfix.clone().installed()], vec![hotfix]);
        assert!(catalog.list_update_candidates().unwrap().is_empty());
    }

    #[test]
    fn test_only_remote_and_remote_or_local() {
        let catalog = catalog(
            vec![pkg("a", "2.0").installed(), pkg("local-only", "1.0").installed()],
            vec![pkg("a", "1.0"), pkg("b", "1.0")],
        );

        let only_remote = catalog.list_only_remote_packages().unwrap();
        assert_eq!(only_remote.len(), 1);
        assert_eq!(only_remote[0].name, "b");

        let mut ids: Vec<String> = catalog
            .list_remote_or_local_packages()
            .unwrap()
            .iter()
            .map(Package::id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a-2.0", "b-1.0"]);
    }

    #[test]
    fn test_get_package_variants() {
        let catalog = catalog(
            vec![pkg("a", "1.0").installed()],
            vec![pkg("a", "2.0")],
        );
        assert!(catalog.get_package("a-1.0").unwrap().is_some());
        assert!(catalog.get_package("a-2.0").unwrap().is_some());
        assert!(catalog.get_local_package("a-2.0").unwrap().is_none());
        assert!(catalog.get_remote_package("a-2.0").unwrap().is_some());
        assert!(catalog.get_package("a-3.0").unwrap().is_none());
    }

    #[test]
    fn test_snapshot_cached_until_flush() {
        let catalog = catalog(vec![pkg("a", "1.0").installed()], vec![pkg("a", "2.0")]);
        let first = catalog.snapshot().unwrap();
        let second = catalog.snapshot().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.installed().count(), 1);

        catalog.flush_cache();
        let third = catalog.snapshot().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn test_snapshot_order() {
        use crate::version::PackageDependency;

        let app = pkg("app", "1.0").with_dependency(PackageDependency::any("lib"));
        let lib = pkg("lib", "1.0").with_local(true);
        let snapshot = CatalogSnapshot::new(vec![lib], vec![app]);

        let mut plan = ResolutionPlan::new();
        plan.add_download("app", Version::parse("1.0").unwrap(), false);
        plan.add_install("lib", Version::parse("1.0").unwrap(), false);
        assert_eq!(snapshot.order(&plan), vec!["lib-1.0", "app-1.0"]);
    }
}
