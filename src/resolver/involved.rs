// src/resolver/involved.rs

//! Involved-set reduction
//!
//! Computes the package names a request can possibly touch, so the
//! constraint universe only holds packages that matter. Alongside, it
//! records which names are referenced with a SNAPSHOT bound; those names
//! are exempt from the default SNAPSHOT exclusion.

use super::ChangeRequest;
use crate::package::Package;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{trace, warn};

/// Names involved in a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvolvedSet {
    names: BTreeSet<String>,
    snapshot_allowed: BTreeSet<String>,
}

impl InvolvedSet {
    /// Close the request over dependency and conflict edges
    ///
    /// Seeds are every requested name, plus every installed name when
    /// `keep_installed` is set. Each involved package pulls in the targets
    /// of its dependencies and conflicts, which are expanded in turn.
    /// `provides` targets are added without being expanded, but a name that
    /// is also reached through a dependency or conflict edge is expanded
    /// regardless of the order the edges are seen in.
    pub fn compute(packages: &[Package], request: &ChangeRequest, keep_installed: bool) -> Self {
        let mut by_name: HashMap<&str, Vec<&Package>> = HashMap::new();
        for pkg in packages {
            by_name.entry(pkg.name.as_str()).or_default().push(pkg);
        }

        let mut set = Self::default();
        let mut expanded: HashSet<String> = HashSet::new();
        let mut worklist: Vec<String> = Vec::new();

        for dep in request.all() {
            if dep.is_snapshot_bounded() {
                set.snapshot_allowed.insert(dep.name.clone());
            }
            set.names.insert(dep.name.clone());
            if expanded.insert(dep.name.clone()) {
                worklist.push(dep.name.clone());
            }
        }

        for pkg in packages.iter().filter(|p| p.is_installed()) {
            if pkg.is_snapshot() {
                set.snapshot_allowed.insert(pkg.name.clone());
            }
            if keep_installed {
                set.names.insert(pkg.name.clone());
                if expanded.insert(pkg.name.clone()) {
                    worklist.push(pkg.name.clone());
                }
            }
        }

        while let Some(name) = worklist.pop() {
            let Some(versions) = by_name.get(name.as_str()) else {
                continue;
            };
            for pkg in versions {
                for edge in pkg.dependencies.iter().chain(&pkg.conflicts) {
                    if edge.is_snapshot_bounded() {
                        set.snapshot_allowed.insert(edge.name.clone());
                    }
                    set.names.insert(edge.name.clone());
                    if !expanded.insert(edge.name.clone()) {
                        continue;
                    }
                    if by_name.contains_key(edge.name.as_str()) {
                        trace!("{} involves {}", pkg.id(), edge.name);
                        worklist.push(edge.name.clone());
                    } else {
                        warn!("Unknown dependency: {} (referenced by {})", edge, pkg.id());
                    }
                }
                for provided in &pkg.provides {
                    set.names.insert(provided.name.clone());
                }
            }
        }

        set
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Whether a package belongs in the universe
    ///
    /// True when its name is involved or it provides an involved name.
    pub fn admits(&self, package: &Package) -> bool {
        self.contains(&package.name)
            || package.provides.iter().any(|p| self.contains(&p.name))
    }

    pub fn is_snapshot_allowed(&self, name: &str) -> bool {
        self.snapshot_allowed.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn snapshot_allowed(&self) -> impl Iterator<Item = &str> {
        self.snapshot_allowed.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::{PackageDependency, Version};

    fn pkg(name: &str, version: &str) -> Package {
        Package::new(name, Version::parse(version).unwrap())
    }

    fn dep(s: &str) -> PackageDependency {
        PackageDependency::parse(s).unwrap()
    }

    fn install(names: &[&str]) -> ChangeRequest {
        ChangeRequest {
            install: names.iter().map(|n| dep(n)).collect(),
            ..Default::default()
        }
    }

    fn catalog() -> Vec<Package> {
        vec![
            pkg("a", "1.0").with_dependency(dep("b:1.0")),
            pkg("b", "1.0").with_conflict(dep("c")),
            pkg("c", "1.0").with_dependency(dep("d")),
            pkg("d", "1.0"),
            pkg("unrelated", "1.0"),
            pkg("installed", "1.0").installed(),
        ]
    }

    #[test]
    fn test_closure_follows_dependencies_and_conflicts() {
        let set = InvolvedSet::compute(&catalog(), &install(&["a"]), false);
        let names: Vec<&str> = set.names().collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        assert!(!set.contains("unrelated"));
    }

    #[test]
    fn test_keep_adds_installed() {
        let set = InvolvedSet::compute(&catalog(), &install(&["d"]), true);
        assert!(set.contains("installed"));
        assert!(!set.contains("a"));

        let set = InvolvedSet::compute(&catalog(), &install(&["d"]), false);
        assert!(!set.contains("installed"));
    }

    #[test]
    fn test_provides_added_not_expanded() {
        let packages = vec![
            pkg("impl", "1.0").with_provides(dep("api")),
            pkg("api", "1.0").with_dependency(dep("deep")),
            pkg("deep", "1.0"),
        ];
        let set = InvolvedSet::compute(&packages, &install(&["impl"]), false);
        assert!(set.contains("api"));
        assert!(!set.contains("deep"));
    }

    #[test]
    fn test_provided_name_expanded_when_also_a_dependency() {
        let packages = vec![
            pkg("app", "1.0").with_dependency(dep("api:1.0:1.0")),
            pkg("impl", "1.0").with_provides(dep("api:2.0:2.0")),
            pkg("api", "1.0").with_dependency(dep("deep")),
            pkg("deep", "1.0"),
        ];
        let forward = InvolvedSet::compute(&packages, &install(&["app", "impl"]), false);
        let backward = InvolvedSet::compute(&packages, &install(&["impl", "app"]), false);
        assert!(forward.contains("deep"));
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_admits_providers_of_involved_names() {
        let packages = vec![
            pkg("app", "1.0").with_dependency(dep("api")),
            pkg("impl", "1.0").with_provides(dep("api")),
        ];
        let set = InvolvedSet::compute(&packages, &install(&["app"]), false);
        assert!(!set.contains("impl"));
        assert!(set.admits(&packages[1]));
    }

    #[test]
    fn test_unknown_dependency_is_skipped() {
        let packages = vec![pkg("a", "1.0").with_dependency(dep("ghost"))];
        let set = InvolvedSet::compute(&packages, &install(&["a"]), false);
        assert!(set.contains("ghost"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_snapshot_allowed_tracking() {
        let packages = vec![
            pkg("a", "1.0").with_dependency(dep("b:1.0-SNAPSHOT")),
            pkg("b", "1.0-SNAPSHOT"),
            pkg("c", "2.0-SNAPSHOT").installed(),
        ];
        let request = ChangeRequest {
            install: vec![dep("a"), dep("x:3.0-SNAPSHOT")],
            ..Default::default()
        };
        let set = InvolvedSet::compute(&packages, &request, false);
        let allowed: Vec<&str> = set.snapshot_allowed().collect();
        assert_eq!(allowed, vec!["b", "c", "x"]);
    }

    #[test]
    fn test_closure_is_idempotent() {
        let first = InvolvedSet::compute(&catalog(), &install(&["a"]), true);
        let second = InvolvedSet::compute(&catalog(), &install(&["a"]), true);
        assert_eq!(first, second);
    }
}
