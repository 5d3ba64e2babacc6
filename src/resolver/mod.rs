// src/resolver/mod.rs

//! Dependency resolution
//!
//! The resolver turns a change request into a `ResolutionPlan`:
//!
//! 1. compute the involved set of names (`involved`)
//! 2. build the integer-numbered constraint universe (`universe`)
//! 3. hand universe and request to an `Oracle` (`sat` by default)
//! 4. interpret the classified solution into plan categories
//! 5. attach a dependency-respecting install order (`graph`)
//!
//! Each call works on a private universe built from an immutable
//! `CatalogSnapshot`, so concurrent calls need no locking.

pub mod graph;
pub mod involved;
pub mod oracle;
pub mod plan;
pub mod sat;
pub mod universe;

pub use graph::DependencyGraph;
pub use involved::InvolvedSet;
pub use oracle::{
    CancellationToken, EntryStatus, Oracle, OracleOutcome, Solution, SolutionEntry, SolveBudget,
};
pub use plan::{PlanStatus, PlannedPackage, PlannedRemoval, ResolutionPlan};
pub use sat::ResolvoOracle;
pub use universe::{IntRange, Relation, Universe, UniverseBuilder, UniverseRequest};

use crate::catalog::CatalogSnapshot;
use crate::error::{Error, Result};
use crate::version::{PackageDependency, VersionRange};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// A change request expressed as name/range edges
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeRequest {
    pub install: Vec<PackageDependency>,
    pub remove: Vec<PackageDependency>,
    pub upgrade: Vec<PackageDependency>,
}

impl ChangeRequest {
    /// Every requested edge, install first, then remove, then upgrade
    pub fn all(&self) -> impl Iterator<Item = &PackageDependency> {
        self.install.iter().chain(&self.remove).chain(&self.upgrade)
    }

    pub fn is_empty(&self) -> bool {
        self.install.is_empty() && self.remove.is_empty() && self.upgrade.is_empty()
    }
}

/// One requested package
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageRequest {
    /// An exact package id (`name-version`)
    ById(String),
    /// A name with an optional version range
    ByNameRange(PackageDependency),
}

impl PackageRequest {
    /// Interpret a user-supplied token
    ///
    /// A token equal to the id of a known package is an id request.
    /// Anything else is parsed as `name[:range]`.
    pub fn from_token(token: &str, snapshot: &CatalogSnapshot) -> Result<Self> {
        let token = token.trim();
        if snapshot.find(token).is_some() {
            return Ok(PackageRequest::ById(token.to_string()));
        }
        Ok(PackageRequest::ByNameRange(PackageDependency::parse(token)?))
    }

    /// The name/range edge this request stands for
    pub fn to_dependency(&self, snapshot: &CatalogSnapshot) -> Result<PackageDependency> {
        match self {
            PackageRequest::ById(id) => {
                let pkg = snapshot
                    .find(id)
                    .ok_or_else(|| Error::NotFound(format!("No package with id {}", id)))?;
                Ok(PackageDependency::new(
                    pkg.name.clone(),
                    VersionRange::exact(pkg.version.clone()),
                ))
            }
            PackageRequest::ByNameRange(dep) => Ok(dep.clone()),
        }
    }
}

impl fmt::Display for PackageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageRequest::ById(id) => write!(f, "{}", id),
            PackageRequest::ByNameRange(dep) => write!(f, "{}", dep),
        }
    }
}

/// Install, remove and upgrade requests for one resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveRequest {
    pub install: Vec<PackageRequest>,
    pub remove: Vec<PackageRequest>,
    pub upgrade: Vec<PackageRequest>,
}

impl ResolveRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_install(mut self, request: PackageRequest) -> Self {
        self.install.push(request);
        self
    }

    pub fn with_remove(mut self, request: PackageRequest) -> Self {
        self.remove.push(request);
        self
    }

    pub fn with_upgrade(mut self, request: PackageRequest) -> Self {
        self.upgrade.push(request);
        self
    }

    /// Build a request from raw tokens, sniffing ids against the snapshot
    pub fn from_tokens(
        install: &[String],
        remove: &[String],
        upgrade: &[String],
        snapshot: &CatalogSnapshot,
    ) -> Result<Self> {
        let parse = |tokens: &[String]| -> Result<Vec<PackageRequest>> {
            tokens
                .iter()
                .map(|t| PackageRequest::from_token(t, snapshot))
                .collect()
        };
        Ok(Self {
            install: parse(install)?,
            remove: parse(remove)?,
            upgrade: parse(upgrade)?,
        })
    }

    /// Resolve every entry to a name/range edge
    pub fn to_change(&self, snapshot: &CatalogSnapshot) -> Result<ChangeRequest> {
        let convert = |requests: &[PackageRequest]| -> Result<Vec<PackageDependency>> {
            requests.iter().map(|r| r.to_dependency(snapshot)).collect()
        };
        Ok(ChangeRequest {
            install: convert(&self.install)?,
            remove: convert(&self.remove)?,
            upgrade: convert(&self.upgrade)?,
        })
    }
}

/// Knobs for one resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Remote packages must be compatible with this platform
    pub target_platform: Option<String>,
    /// Admit every SNAPSHOT version
    pub allow_snapshot: bool,
    /// Keep installed packages unless a request forces them out
    pub keep_installed: bool,
    /// Deadline for the oracle
    pub timeout: Option<Duration>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            target_platform: None,
            allow_snapshot: false,
            keep_installed: true,
            timeout: None,
        }
    }
}

impl ResolveOptions {
    pub fn with_target_platform(mut self, platform: impl Into<String>) -> Self {
        self.target_platform = Some(platform.into());
        self
    }

    pub fn with_allow_snapshot(mut self, allow: bool) -> Self {
        self.allow_snapshot = allow;
        self
    }

    pub fn with_keep_installed(mut self, keep: bool) -> Self {
        self.keep_installed = keep;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Resolution driver over one catalog snapshot
pub struct Resolver<O: Oracle = ResolvoOracle> {
    snapshot: Arc<CatalogSnapshot>,
    options: ResolveOptions,
    oracle: O,
}

impl Resolver<ResolvoOracle> {
    /// Create a resolver backed by the resolvo oracle
    pub fn new(snapshot: Arc<CatalogSnapshot>, options: ResolveOptions) -> Self {
        let oracle = ResolvoOracle::new();
        Self::with_oracle(snapshot, options, oracle)
    }
}

impl<O: Oracle> Resolver<O> {
    pub fn with_oracle(snapshot: Arc<CatalogSnapshot>, options: ResolveOptions, oracle: O) -> Self {
        Self {
            snapshot,
            options,
            oracle,
        }
    }

    pub fn snapshot(&self) -> &CatalogSnapshot {
        &self.snapshot
    }

    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    /// Build the constraint universe for a request
    pub fn build_universe(&self, request: &ChangeRequest) -> Result<(Universe, UniverseRequest)> {
        UniverseBuilder::new(&self.snapshot, &self.options).build(request)
    }

    /// Render the universe for a request as CUDF text
    pub fn cudf(&self, request: &ResolveRequest) -> Result<String> {
        let change = request.to_change(&self.snapshot)?;
        let (universe, universe_request) = self.build_universe(&change)?;
        Ok(universe.to_cudf(&universe_request))
    }

    /// Resolve a request, bounded by the configured timeout
    pub fn resolve(&self, request: &ResolveRequest) -> Result<ResolutionPlan> {
        self.resolve_with_budget(request, &SolveBudget::from_timeout(self.options.timeout))
    }

    /// Resolve a single install token (an id or `name[:range]`)
    pub fn resolve_one(&self, token: &str) -> Result<ResolutionPlan> {
        let request =
            ResolveRequest::new().with_install(PackageRequest::from_token(token, &self.snapshot)?);
        self.resolve(&request)
    }

    /// Resolve a request under an explicit budget
    ///
    /// Returns `Unresolvable` carrying the failed plan when the oracle
    /// finds no solution, and `Cancelled` when the budget runs out.
    pub fn resolve_with_budget(
        &self,
        request: &ResolveRequest,
        budget: &SolveBudget,
    ) -> Result<ResolutionPlan> {
        let change = request.to_change(&self.snapshot)?;
        let (universe, universe_request) = self.build_universe(&change)?;
        debug!("CUDF universe:\n{}", universe.to_cudf(&universe_request));

        let solution = match self.oracle.solve(&universe, &universe_request, budget)? {
            OracleOutcome::Solved(solution) => solution,
            OracleOutcome::NoSolution(reason) => {
                let mut plan = ResolutionPlan::new();
                plan.mark_failed(reason);
                return Err(Error::Unresolvable(Box::new(plan)));
            }
        };

        if !solution.optimal {
            warn!("Solver returned a solution that is not proven optimal");
        }

        let mut plan = Self::interpret(&universe, &universe_request, &solution);
        plan.set_install_order(self.snapshot.order(&plan));
        plan.mark_succeeded();

        info!(
            "Resolved: {} to install, {} to download, {} unchanged, {} to remove",
            plan.install().len(),
            plan.to_download().len(),
            plan.unchanged().len(),
            plan.remove().len()
        );
        Ok(plan)
    }

    /// Sort classified solution entries into plan categories
    ///
    /// An upgraded SNAPSHOT kept at the same number but admitted as its
    /// remote build is a refresh: the installed build is replaced by a
    /// download of the remote one.
    fn interpret(
        universe: &Universe,
        request: &UniverseRequest,
        solution: &Solution,
    ) -> ResolutionPlan {
        let mut plan = ResolutionPlan::new();
        let upgraded: HashSet<&str> = request.upgrade.iter().map(|r| r.name.as_str()).collect();

        for entry in &solution.entries {
            let Some(pkg) = universe.get(&entry.name, entry.number) else {
                warn!(
                    "Solution entry {}-{} has no universe counterpart, skipping",
                    entry.name, entry.number
                );
                continue;
            };
            let version = pkg.version().clone();

            let added = match entry.status {
                EntryStatus::Removed => {
                    let replaced = solution.selected_number(&entry.name).is_some();
                    plan.mark_for_removal(&entry.name, version, replaced)
                }
                EntryStatus::New | EntryStatus::VersionChanged => {
                    let is_upgrade = entry.status == EntryStatus::VersionChanged;
                    if pkg.package.local {
                        plan.add_install(&entry.name, version, is_upgrade)
                    } else {
                        plan.add_download(&entry.name, version, is_upgrade)
                    }
                }
                EntryStatus::Unchanged
                    if upgraded.contains(entry.name.as_str())
                        && version.is_snapshot()
                        && !pkg.package.local =>
                {
                    debug!("Refresh {} from remote build", pkg.package.id());
                    plan.mark_for_removal(&entry.name, version.clone(), true)
                        && plan.add_download(&entry.name, version, true)
                }
                EntryStatus::Unchanged => plan.add_unchanged(&entry.name, version),
            };

            if !added {
                error!(
                    "Could not add {} ({}) to the plan",
                    pkg.package.id(),
                    entry.status
                );
            }
        }

        plan
    }
}
