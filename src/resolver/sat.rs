// src/resolver/sat.rs

//! SAT-backed oracle using resolvo
//!
//! Every universe entry becomes a resolvo solvable. Version sets are
//! integer ranges over one name, optionally negated so that conflicts and
//! removals can be expressed as constraints. `provides` edges become extra
//! alternatives in a requirement union.
//!
//! Preferences: candidates are tried highest number first, the installed
//! version is favored unless its name is being upgraded, and installed
//! packages the request does not name are soft requirements, so removals
//! are kept to a minimum whichever packages ended up in the universe.

use super::oracle::{Oracle, OracleOutcome, SolveBudget, Solution};
use super::universe::{IntRange, Relation, Universe, UniverseRequest};
use crate::error::{Error, Result};
use resolvo::{
    Candidates, Condition, ConditionId, ConditionalRequirement, Dependencies,
    HintDependenciesAvailable, KnownDependencies, NameId, Problem, Requirement, SolvableId,
    Solver, SolverCache, StringId, UnsolvableOrCancelled, VersionSetId, VersionSetUnionId,
};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, trace};

/// An integer range over one name; negated sets match the complement
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct VersionSet {
    name: NameId,
    range: IntRange,
    negated: bool,
}

impl VersionSet {
    fn matches(&self, number: u32) -> bool {
        self.range.contains(number) != self.negated
    }
}

/// resolvo view of a universe
struct UniverseProvider<'a> {
    universe: &'a Universe,
    budget: &'a SolveBudget,

    names: Vec<String>,
    names_rev: HashMap<String, NameId>,
    /// Parallel to the universe package list
    solvable_names: Vec<NameId>,
    candidates: HashMap<NameId, Vec<SolvableId>>,
    favored: HashMap<NameId, SolvableId>,
    version_sets: Vec<VersionSet>,
    version_sets_rev: HashMap<VersionSet, VersionSetId>,
    unions: Vec<Vec<VersionSetId>>,
    conditions: Vec<Condition>,
    strings: Vec<String>,
    dependencies: HashMap<SolvableId, KnownDependencies>,
}

impl<'a> UniverseProvider<'a> {
    fn new(
        universe: &'a Universe,
        request: &UniverseRequest,
        budget: &'a SolveBudget,
    ) -> Self {
        let mut provider = Self {
            universe,
            budget,
            names: Vec::new(),
            names_rev: HashMap::new(),
            solvable_names: Vec::new(),
            candidates: HashMap::new(),
            favored: HashMap::new(),
            version_sets: Vec::new(),
            version_sets_rev: HashMap::new(),
            unions: Vec::new(),
            conditions: Vec::new(),
            strings: Vec::new(),
            dependencies: HashMap::new(),
        };

        let upgraded: HashSet<&str> = request.upgrade.iter().map(|r| r.name.as_str()).collect();

        for (index, pkg) in universe.packages().iter().enumerate() {
            let name = provider.intern_name(pkg.name());
            let solvable = SolvableId(index as u32);
            provider.solvable_names.push(name);
            provider.candidates.entry(name).or_default().push(solvable);

            // Packages are listed lowest number first, so the highest
            // installed version wins
            if pkg.installed && !upgraded.contains(pkg.name()) {
                provider.favored.insert(name, solvable);
            }
        }

        for (index, pkg) in universe.packages().iter().enumerate() {
            let mut requirements = Vec::new();
            for relation in &pkg.depends {
                requirements.push(provider.requirement(relation));
            }

            let mut constrains = Vec::new();
            for relation in pkg.conflicts.iter().filter(|r| r.name != pkg.name()) {
                constrains.extend(provider.exclusions(relation));
            }

            provider.dependencies.insert(
                SolvableId(index as u32),
                KnownDependencies {
                    requirements,
                    constrains,
                },
            );
        }

        provider
    }

    fn intern_name(&mut self, name: &str) -> NameId {
        if let Some(&id) = self.names_rev.get(name) {
            return id;
        }
        let id = NameId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.names_rev.insert(name.to_string(), id);
        self.candidates.entry(id).or_default();
        id
    }

    fn intern_version_set(&mut self, name: &str, range: IntRange, negated: bool) -> VersionSetId {
        let set = VersionSet {
            name: self.intern_name(name),
            range,
            negated,
        };
        if let Some(&id) = self.version_sets_rev.get(&set) {
            return id;
        }
        let id = VersionSetId(self.version_sets.len() as u32);
        self.version_sets.push(set.clone());
        self.version_sets_rev.insert(set, id);
        id
    }

    /// The relation itself, or any of its providers
    fn requirement(&mut self, relation: &Relation) -> ConditionalRequirement {
        let mut sets = vec![self.intern_version_set(&relation.name, relation.range, false)];
        for provider in &relation.providers {
            sets.push(self.intern_version_set(
                &provider.name,
                IntRange::Exact(provider.number),
                false,
            ));
        }

        let requirement = if sets.len() == 1 {
            Requirement::Single(sets[0])
        } else {
            let id = VersionSetUnionId(self.unions.len() as u32);
            self.unions.push(sets);
            Requirement::Union(id)
        };

        ConditionalRequirement {
            condition: None,
            requirement,
        }
    }

    /// Constraints forbidding the relation's versions and its providers
    fn exclusions(&mut self, relation: &Relation) -> Vec<VersionSetId> {
        let mut sets = vec![self.intern_version_set(&relation.name, relation.range, true)];
        for provider in &relation.providers {
            sets.push(self.intern_version_set(
                &provider.name,
                IntRange::Exact(provider.number),
                true,
            ));
        }
        sets
    }

    fn number(&self, solvable: SolvableId) -> u32 {
        self.universe.packages()[solvable.0 as usize].number
    }

    /// Build the resolvo problem for a request
    fn problem(&mut self, request: &UniverseRequest) -> (Problem<Vec<SolvableId>>, Vec<SolvableId>) {
        let mut requirements = Vec::new();
        for relation in &request.install {
            requirements.push(self.requirement(relation));
        }

        for relation in &request.upgrade {
            let floor = self
                .universe
                .installed_of(&relation.name)
                .map(|p| p.number)
                .max();
            let range = match floor {
                Some(n) => relation.range.intersect(&IntRange::AtLeast(n)),
                None => relation.range,
            };
            let set = self.intern_version_set(&relation.name, range, false);
            requirements.push(ConditionalRequirement {
                condition: None,
                requirement: Requirement::Single(set),
            });
        }

        let mut constraints = Vec::new();
        for relation in &request.remove {
            constraints.push(self.intern_version_set(&relation.name, relation.range, true));
        }

        let targeted: HashSet<&str> = request
            .install
            .iter()
            .chain(&request.remove)
            .chain(&request.upgrade)
            .map(|r| r.name.as_str())
            .collect();
        let soft: Vec<SolvableId> = self
            .universe
            .packages()
            .iter()
            .enumerate()
            .filter(|(_, pkg)| pkg.installed && !targeted.contains(pkg.name()))
            .map(|(index, _)| SolvableId(index as u32))
            .collect();

        let problem = Problem::new()
            .requirements(requirements)
            .constraints(constraints)
            .soft_requirements(soft.clone());
        (problem, soft)
    }
}

struct DisplayVersionSet<'a, 'u>(&'a UniverseProvider<'u>, VersionSetId);

impl fmt::Display for DisplayVersionSet<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let set = &self.0.version_sets[self.1.0 as usize];
        let relation = Relation::new(self.0.names[set.name.0 as usize].clone(), set.range);
        if set.negated {
            write!(f, "not ({})", relation)
        } else {
            write!(f, "{}", relation)
        }
    }
}

impl resolvo::Interner for UniverseProvider<'_> {
    fn display_solvable(&self, solvable: SolvableId) -> impl fmt::Display + '_ {
        let pkg = &self.universe.packages()[solvable.0 as usize];
        format!("{} ({})", pkg.key(), pkg.package.id())
    }

    fn display_name(&self, name: NameId) -> impl fmt::Display + '_ {
        &self.names[name.0 as usize]
    }

    fn display_version_set(&self, version_set: VersionSetId) -> impl fmt::Display + '_ {
        DisplayVersionSet(self, version_set)
    }

    fn display_string(&self, string_id: StringId) -> impl fmt::Display + '_ {
        &self.strings[string_id.0 as usize]
    }

    fn version_set_name(&self, version_set: VersionSetId) -> NameId {
        self.version_sets[version_set.0 as usize].name
    }

    fn solvable_name(&self, solvable: SolvableId) -> NameId {
        self.solvable_names[solvable.0 as usize]
    }

    fn version_sets_in_union(
        &self,
        version_set_union: VersionSetUnionId,
    ) -> impl Iterator<Item = VersionSetId> {
        self.unions[version_set_union.0 as usize].iter().copied()
    }

    fn resolve_condition(&self, condition: ConditionId) -> Condition {
        self.conditions[condition.as_u32() as usize].clone()
    }
}

impl resolvo::DependencyProvider for UniverseProvider<'_> {
    async fn get_candidates(&self, name: NameId) -> Option<Candidates> {
        let solvables = self.candidates.get(&name)?;
        Some(Candidates {
            candidates: solvables.clone(),
            favored: self.favored.get(&name).copied(),
            locked: None,
            hint_dependencies_available: HintDependenciesAvailable::All,
            excluded: Vec::new(),
        })
    }

    async fn sort_candidates(&self, _solver: &SolverCache<Self>, solvables: &mut [SolvableId]) {
        // Highest version first
        solvables.sort_by_key(|&s| std::cmp::Reverse(self.number(s)));
    }

    async fn filter_candidates(
        &self,
        candidates: &[SolvableId],
        version_set: VersionSetId,
        inverse: bool,
    ) -> Vec<SolvableId> {
        let set = &self.version_sets[version_set.0 as usize];
        candidates
            .iter()
            .copied()
            .filter(|&s| set.matches(self.number(s)) != inverse)
            .collect()
    }

    async fn get_dependencies(&self, solvable: SolvableId) -> Dependencies {
        match self.dependencies.get(&solvable) {
            Some(deps) => Dependencies::Known(deps.clone()),
            None => Dependencies::Known(KnownDependencies {
                requirements: Vec::new(),
                constrains: Vec::new(),
            }),
        }
    }

    fn should_cancel_with_value(&self) -> Option<Box<dyn Any>> {
        self.budget
            .exhausted()
            .map(|reason| Box::new(reason.to_string()) as Box<dyn Any>)
    }
}

/// Oracle backed by the resolvo SAT solver
///
/// Keep mode is not an oracle setting: it only widens the involved set.
/// Every installed package that reaches the universe is kept if it can be.
#[derive(Debug, Clone, Default)]
pub struct ResolvoOracle;

impl ResolvoOracle {
    pub fn new() -> Self {
        Self
    }
}

impl Oracle for ResolvoOracle {
    fn solve(
        &self,
        universe: &Universe,
        request: &UniverseRequest,
        budget: &SolveBudget,
    ) -> Result<OracleOutcome> {
        if let Some(reason) = budget.exhausted() {
            return Err(Error::Cancelled(reason.to_string()));
        }

        let mut provider = UniverseProvider::new(universe, request, budget);
        let (problem, soft) = provider.problem(request);
        debug!(
            "Solving {} solvables ({} soft requirements)",
            universe.len(),
            soft.len()
        );

        let mut solver = Solver::new(provider);
        match solver.solve(problem) {
            Ok(solvables) => {
                let provider = solver.provider();
                let chosen: HashSet<SolvableId> = solvables.iter().copied().collect();
                let chosen_names: HashSet<NameId> =
                    chosen.iter().map(|&s| provider.solvable_names[s.0 as usize]).collect();
                // An installed version replaced by another version of the
                // same name is an upgrade, not a lost package
                let dropped = soft
                    .iter()
                    .filter(|&&s| !chosen.contains(&s))
                    .filter(|&&s| !chosen_names.contains(&provider.solvable_names[s.0 as usize]))
                    .count();
                if dropped > 0 {
                    debug!("{} installed packages could not be kept", dropped);
                }

                let selected: Vec<(String, u32)> = solvables
                    .iter()
                    .map(|&s| {
                        let pkg = &provider.universe.packages()[s.0 as usize];
                        trace!("Selected {}", pkg.key());
                        (pkg.name().to_string(), pkg.number)
                    })
                    .collect();

                Ok(OracleOutcome::Solved(Solution::classify(
                    universe,
                    &selected,
                    dropped == 0,
                )))
            }
            Err(UnsolvableOrCancelled::Unsolvable(conflict)) => Ok(OracleOutcome::NoSolution(
                conflict.display_user_friendly(&solver).to_string(),
            )),
            Err(UnsolvableOrCancelled::Cancelled(value)) => {
                let reason = value
                    .downcast::<String>()
                    .map(|reason| *reason)
                    .unwrap_or_else(|_| "cancelled".to_string());
                Err(Error::Cancelled(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogSnapshot;
    use crate::package::Package;
    use crate::resolver::oracle::EntryStatus;
    use crate::resolver::universe::UniverseBuilder;
    use crate::resolver::{ChangeRequest, ResolveOptions};
    use crate::version::{PackageDependency, Version};

    fn pkg(name: &str, version: &str) -> Package {
        Package::new(name, Version::parse(version).unwrap())
    }

    fn dep(s: &str) -> PackageDependency {
        PackageDependency::parse(s).unwrap()
    }

    fn solve(
        local: Vec<Package>,
        remote: Vec<Package>,
        request: ChangeRequest,
        keep: bool,
    ) -> OracleOutcome {
        let snapshot = CatalogSnapshot::new(local, remote);
        let options = ResolveOptions::default().with_keep_installed(keep);
        let (universe, request) = UniverseBuilder::new(&snapshot, &options)
            .build(&request)
            .unwrap();
        ResolvoOracle::new()
            .solve(&universe, &request, &SolveBudget::unbounded())
            .unwrap()
    }

    fn install(deps: &[&str]) -> ChangeRequest {
        ChangeRequest {
            install: deps.iter().map(|d| dep(d)).collect(),
            ..Default::default()
        }
    }

    fn entries(outcome: &OracleOutcome) -> Vec<(String, u32, EntryStatus)> {
        match outcome {
            OracleOutcome::Solved(solution) => solution
                .entries
                .iter()
                .map(|e| (e.name.clone(), e.number, e.status))
                .collect(),
            OracleOutcome::NoSolution(msg) => panic!("no solution: {}", msg),
        }
    }

    #[test]
    fn test_prefers_highest_version() {
        let outcome = solve(
            vec![],
            vec![pkg("a", "1.0"), pkg("a", "2.0")],
            install(&["a"]),
            true,
        );
        assert_eq!(entries(&outcome), vec![("a".to_string(), 2, EntryStatus::New)]);
    }

    #[test]
    fn test_dependency_pulled_in() {
        let outcome = solve(
            vec![],
            vec![
                pkg("app", "1.0").with_dependency(dep("lib:1.0:1.5")),
                pkg("lib", "1.0"),
                pkg("lib", "2.0"),
            ],
            install(&["app"]),
            true,
        );
        assert_eq!(
            entries(&outcome),
            vec![
                ("app".to_string(), 1, EntryStatus::New),
                ("lib".to_string(), 1, EntryStatus::New),
            ]
        );
    }

    #[test]
    fn test_installed_version_favored() {
        let outcome = solve(
            vec![pkg("lib", "1.0").installed()],
            vec![pkg("app", "1.0").with_dependency(dep("lib")), pkg("lib", "2.0")],
            install(&["app"]),
            true,
        );
        assert!(entries(&outcome).contains(&("lib".to_string(), 1, EntryStatus::Unchanged)));
    }

    #[test]
    fn test_conflict_forces_removal() {
        let outcome = solve(
            vec![pkg("old", "1.0").installed()],
            vec![pkg("new", "1.0").with_conflict(dep("old"))],
            install(&["new"]),
            true,
        );
        let solution = match outcome {
            OracleOutcome::Solved(solution) => solution,
            OracleOutcome::NoSolution(msg) => panic!("{}", msg),
        };
        assert!(!solution.optimal);
        assert_eq!(
            solution.with_status(EntryStatus::Removed).next().map(|e| e.name.as_str()),
            Some("old")
        );
    }

    #[test]
    fn test_involved_installed_package_kept_without_keep_mode() {
        let outcome = solve(
            vec![pkg("lib", "1.0").installed()],
            vec![
                pkg("lib", "2.0"),
                pkg("app", "1.0").with_conflict(dep("lib:2.0:2.0")),
            ],
            install(&["app"]),
            false,
        );
        let entries = entries(&outcome);
        assert!(entries.contains(&("lib".to_string(), 1, EntryStatus::Unchanged)));
        assert!(!entries.iter().any(|e| e.2 == EntryStatus::Removed));
    }

    #[test]
    fn test_forced_upgrade_is_still_optimal() {
        let outcome = solve(
            vec![pkg("lib", "1.0").installed()],
            vec![
                pkg("lib", "2.0"),
                pkg("app", "1.0").with_dependency(dep("lib:2.0")),
            ],
            install(&["app"]),
            true,
        );
        let OracleOutcome::Solved(solution) = outcome else {
            panic!("expected a solution");
        };
        assert!(solution.optimal);
        assert_eq!(solution.selected_number("lib"), Some(2));
    }

    #[test]
    fn test_provider_satisfies_virtual_dependency() {
        let outcome = solve(
            vec![],
            vec![
                pkg("app", "1.0").with_dependency(dep("api")),
                pkg("impl", "1.0").with_provides(dep("api")),
            ],
            install(&["app"]),
            true,
        );
        assert!(entries(&outcome).contains(&("impl".to_string(), 1, EntryStatus::New)));
    }

    #[test]
    fn test_remove_request() {
        let request = ChangeRequest {
            remove: vec![dep("a")],
            ..Default::default()
        };
        let outcome = solve(vec![pkg("a", "1.0").installed()], vec![], request, true);
        assert_eq!(entries(&outcome), vec![("a".to_string(), 1, EntryStatus::Removed)]);
    }

    #[test]
    fn test_unsatisfiable_reports_no_solution() {
        let outcome = solve(
            vec![],
            vec![
                pkg("a", "1.0").with_dependency(dep("b:2.0")),
                pkg("b", "1.0"),
            ],
            install(&["a"]),
            true,
        );
        assert!(matches!(outcome, OracleOutcome::NoSolution(_)));
    }

    #[test]
    fn test_cancelled_budget() {
        let snapshot = CatalogSnapshot::new(vec![], vec![pkg("a", "1.0")]);
        let options = ResolveOptions::default();
        let (universe, request) = UniverseBuilder::new(&snapshot, &options)
            .build(&install(&["a"]))
            .unwrap();
        let budget = SolveBudget::unbounded();
        budget.token.cancel();

        let err = ResolvoOracle::default()
            .solve(&universe, &request, &budget)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled(_)));
    }
}
