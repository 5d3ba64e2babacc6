// src/resolver/graph.rs

//! Dependency graph for install ordering
//!
//! Nodes are the packages a plan installs; an edge runs from a package to
//! each planned package satisfying one of its dependencies, either by name
//! or through a `provides` edge. Ordering is deterministic: ties are broken
//! by package name.

use crate::package::Package;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::warn;

/// A node in the dependency graph representing a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageNode {
    pub name: String,
    pub id: String,
}

/// Dependency graph over planned packages
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Map from package name to its node
    nodes: BTreeMap<String, PackageNode>,
    /// Map from package name to the names it depends on
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph over the given packages
    ///
    /// Dependencies on packages outside the set are ignored, since those
    /// are already installed or not part of this plan.
    pub fn from_packages<'a>(packages: impl IntoIterator<Item = &'a Package>) -> Self {
        let packages: Vec<&Package> = packages.into_iter().collect();
        let mut graph = Self::new();

        for pkg in &packages {
            graph.add_node(PackageNode {
                name: pkg.name.clone(),
                id: pkg.id(),
            });
        }

        for pkg in &packages {
            for dep in &pkg.dependencies {
                let satisfiers = packages.iter().filter(|other| {
                    other.name != pkg.name
                        && (other.name == dep.name
                            || other.provides.iter().any(|p| p.name == dep.name))
                });
                for other in satisfiers {
                    graph.add_edge(&pkg.name, &other.name);
                }
            }
        }

        graph
    }

    pub fn add_node(&mut self, node: PackageNode) {
        self.nodes.insert(node.name.clone(), node);
    }

    /// Record that `from` depends on `to`
    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
    }

    pub fn get_node(&self, name: &str) -> Option<&PackageNode> {
        self.nodes.get(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Dependencies of `name` that are nodes of this graph
    fn dependencies_of(&self, name: &str) -> impl Iterator<Item = &String> {
        self.edges
            .get(name)
            .into_iter()
            .flatten()
            .filter(|to| self.nodes.contains_key(*to))
    }

    /// Perform topological sort using Kahn's algorithm
    ///
    /// Returns package names in installation order (dependencies before
    /// dependents), or `Err` with the names left over when a cycle blocks
    /// progress.
    pub fn topological_sort(&self) -> std::result::Result<Vec<String>, Vec<String>> {
        let (ordered, remaining) = self.kahn();
        if remaining.is_empty() {
            Ok(ordered)
        } else {
            Err(remaining)
        }
    }

    /// Kahn's algorithm; returns the placed names and those stuck behind a cycle
    fn kahn(&self) -> (Vec<String>, Vec<String>) {
        // Number of unresolved dependencies per package
        let mut pending: BTreeMap<&str, usize> = self
            .nodes
            .keys()
            .map(|name| (name.as_str(), self.dependencies_of(name).count()))
            .collect();

        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for name in self.nodes.keys() {
            for dep in self.dependencies_of(name) {
                dependents.entry(dep.as_str()).or_default().push(name.as_str());
            }
        }

        let mut ready: BTreeSet<&str> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut ordered = Vec::with_capacity(self.nodes.len());

        while let Some(name) = ready.pop_first() {
            ordered.push(name.to_string());
            for dependent in dependents.get(name).into_iter().flatten() {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        let placed: HashSet<&str> = ordered.iter().map(String::as_str).collect();
        let remaining = self
            .nodes
            .keys()
            .filter(|name| !placed.contains(name.as_str()))
            .cloned()
            .collect();
        (ordered, remaining)
    }

    /// Detect circular dependencies in the graph
    ///
    /// Returns the packages involved in a cycle, or None if no cycle exists
    pub fn detect_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut cycle = Vec::new();

        for name in self.nodes.keys() {
            if !visited.contains(name.as_str())
                && self.dfs_cycle_detect(name, &mut visited, &mut rec_stack, &mut cycle)
            {
                cycle.reverse();
                return Some(cycle);
            }
        }

        None
    }

    fn dfs_cycle_detect<'a>(
        &'a self,
        name: &'a str,
        visited: &mut HashSet<&'a str>,
        rec_stack: &mut HashSet<&'a str>,
        cycle: &mut Vec<String>,
    ) -> bool {
        visited.insert(name);
        rec_stack.insert(name);

        for dep in self.dependencies_of(name) {
            if !visited.contains(dep.as_str()) {
                if self.dfs_cycle_detect(dep, visited, rec_stack, cycle) {
                    cycle.push(name.to_string());
                    return true;
                }
            } else if rec_stack.contains(dep.as_str()) {
                cycle.push(dep.clone());
                cycle.push(name.to_string());
                return true;
            }
        }

        rec_stack.remove(name);
        false
    }

    /// Package ids in installation order
    ///
    /// A cycle does not fail ordering: it is logged and the packages caught
    /// behind it are appended by name.
    pub fn install_order(&self) -> Vec<String> {
        let (mut names, remaining) = self.kahn();
        if !remaining.is_empty() {
            let cycle = self.detect_cycle().unwrap_or_else(|| remaining.clone());
            warn!("Dependency cycle detected: {}", cycle.join(" -> "));
            names.extend(remaining);
        }

        names
            .into_iter()
            .filter_map(|name| self.nodes.get(&name).map(|node| node.id.clone()))
            .collect()
    }
}
