// src/resolver/universe.rs

//! Constraint universe construction
//!
//! Maps the involved part of a catalog snapshot into a universe the oracle
//! reasons about. Every admitted version gets a per-name integer number
//! (1 for the lowest version), and every edge is rewritten as a range over
//! those numbers.
//!
//! Admission filters, in order:
//! 1. not involved by the request (and provides nothing involved)
//! 2. remote and incompatible with the configured target platform
//! 3. SNAPSHOT, not studio, and not SNAPSHOT-allowed (unless globally allowed)
//!
//! A local SNAPSHOT package whose name is being upgraded is replaced by the
//! remote package of the same id, when there is one.

use super::involved::InvolvedSet;
use super::{ChangeRequest, ResolveOptions};
use crate::catalog::CatalogSnapshot;
use crate::error::{Error, Result};
use crate::package::{Package, PackageType};
use crate::version::{PackageDependency, Version, VersionRange};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, warn};

/// A set of integer versions of one name
///
/// Always a contiguous interval, because numbering follows version order
/// and version ranges are intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntRange {
    Any,
    Exact(u32),
    AtLeast(u32),
    AtMost(u32),
    Between(u32, u32),
    /// Matches no version
    Nothing,
}

impl IntRange {
    /// Inclusive bounds, `None` when empty
    fn bounds(&self) -> Option<(u32, u32)> {
        match *self {
            IntRange::Any => Some((1, u32::MAX)),
            IntRange::Exact(n) => Some((n, n)),
            IntRange::AtLeast(n) => Some((n, u32::MAX)),
            IntRange::AtMost(n) => Some((1, n)),
            IntRange::Between(lo, hi) if lo <= hi => Some((lo, hi)),
            IntRange::Between(..) | IntRange::Nothing => None,
        }
    }

    fn from_bounds(lo: Option<u32>, hi: Option<u32>) -> Self {
        match (lo, hi) {
            (None, None) => IntRange::Any,
            (Some(lo), None) => IntRange::AtLeast(lo),
            (None, Some(hi)) => IntRange::AtMost(hi),
            (Some(lo), Some(hi)) if lo == hi => IntRange::Exact(lo),
            (Some(lo), Some(hi)) if lo < hi => IntRange::Between(lo, hi),
            _ => IntRange::Nothing,
        }
    }

    pub fn contains(&self, number: u32) -> bool {
        self.bounds()
            .is_some_and(|(lo, hi)| lo <= number && number <= hi)
    }

    pub fn is_empty(&self) -> bool {
        self.bounds().is_none()
    }

    pub fn intersect(&self, other: &IntRange) -> IntRange {
        match (self.bounds(), other.bounds()) {
            (Some((lo_a, hi_a)), Some((lo_b, hi_b))) => {
                let lo = lo_a.max(lo_b);
                let hi = hi_a.min(hi_b);
                if lo > hi {
                    IntRange::Nothing
                } else {
                    IntRange::from_bounds(
                        (lo > 1).then_some(lo),
                        (hi < u32::MAX).then_some(hi),
                    )
                }
            }
            _ => IntRange::Nothing,
        }
    }
}

/// A package version that provides a capability
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderRef {
    pub name: String,
    pub number: u32,
}

/// An edge rewritten against the integer numbering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub name: String,
    pub range: IntRange,
    /// Admitted packages whose `provides` satisfy this edge
    pub providers: Vec<ProviderRef>,
}

impl Relation {
    pub fn new(name: impl Into<String>, range: IntRange) -> Self {
        Self {
            name: name.into(),
            range,
            providers: Vec::new(),
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = &self.name;
        match self.range {
            IntRange::Any => write!(f, "{}", name),
            IntRange::Exact(n) => write!(f, "{} = {}", name, n),
            IntRange::AtLeast(n) => write!(f, "{} >= {}", name, n),
            IntRange::AtMost(n) => write!(f, "{} <= {}", name, n),
            IntRange::Between(lo, hi) => write!(f, "{} >= {}, {} <= {}", name, lo, name, hi),
            IntRange::Nothing => write!(f, "{} < 1", name),
        }
    }
}

/// One admitted (name, version) pair
#[derive(Debug, Clone)]
pub struct UniversePackage {
    pub package: Package,
    pub number: u32,
    pub installed: bool,
    pub depends: Vec<Relation>,
    /// Declared conflicts; the conflict with other versions of the same
    /// name is implicit
    pub conflicts: Vec<Relation>,
    pub provides: Vec<Relation>,
}

impl UniversePackage {
    pub fn name(&self) -> &str {
        &self.package.name
    }

    pub fn version(&self) -> &Version {
        &self.package.version
    }

    /// Key in the integer numbering: `name-number`
    pub fn key(&self) -> String {
        format!("{}-{}", self.package.name, self.number)
    }
}

/// The change request, rewritten against the integer numbering
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniverseRequest {
    pub install: Vec<Relation>,
    pub remove: Vec<Relation>,
    pub upgrade: Vec<Relation>,
}

/// Admitted packages with their constraints
#[derive(Debug, Clone, Default)]
pub struct Universe {
    /// Sorted by name, then by number
    packages: Vec<UniversePackage>,
    by_name: BTreeMap<String, Vec<usize>>,
    involved: InvolvedSet,
}

impl Universe {
    pub fn packages(&self) -> &[UniversePackage] {
        &self.packages
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn involved(&self) -> &InvolvedSet {
        &self.involved
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Every admitted version of `name`, lowest number first
    pub fn versions_of(&self, name: &str) -> impl Iterator<Item = &UniversePackage> {
        self.by_name
            .get(name)
            .into_iter()
            .flatten()
            .map(|&i| &self.packages[i])
    }

    pub fn get(&self, name: &str, number: u32) -> Option<&UniversePackage> {
        self.versions_of(name).find(|p| p.number == number)
    }

    /// Look up by `name-number` key
    pub fn get_by_key(&self, key: &str) -> Option<&UniversePackage> {
        let (name, number) = key.rsplit_once('-')?;
        self.get(name, number.parse().ok()?)
    }

    pub fn installed_of(&self, name: &str) -> impl Iterator<Item = &UniversePackage> {
        self.versions_of(name).filter(|p| p.installed)
    }

    pub fn number_of(&self, name: &str, version: &Version) -> Option<u32> {
        self.versions_of(name)
            .find(|p| p.version() == version)
            .map(|p| p.number)
    }

    /// Render the universe and request as CUDF text
    pub fn to_cudf(&self, request: &UniverseRequest) -> String {
        let mut out = String::new();
        let join = |relations: &[Relation]| {
            relations
                .iter()
                .map(Relation::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };

        for pkg in &self.packages {
            let mut conflicts: Vec<String> = pkg.conflicts.iter().map(Relation::to_string).collect();
            conflicts.push(format!("{} != {}", pkg.name(), pkg.number));

            out.push_str(&format!("package: {}\n", pkg.name()));
            out.push_str(&format!("version: {}\n", pkg.number));
            out.push_str(&format!("installed: {}\n", pkg.installed));
            out.push_str(&format!("depends: {}\n", join(&pkg.depends)));
            out.push_str(&format!("conflicts: {}\n", conflicts.join(", ")));
            out.push_str(&format!("provides: {}\n", join(&pkg.provides)));
            out.push('\n');
        }

        out.push_str("request: \n");
        out.push_str(&format!("install: {}\n", join(&request.install)));
        out.push_str(&format!("remove: {}\n", join(&request.remove)));
        out.push_str(&format!("upgrade: {}\n", join(&request.upgrade)));
        out
    }
}

/// Whether two inclusive version ranges share at least one point
fn ranges_overlap(a: &VersionRange, b: &VersionRange) -> bool {
    let below = |max: &Option<Version>, min: &Option<Version>| match (max, min) {
        (Some(max), Some(min)) => max < min,
        _ => false,
    };
    !below(&a.max, &b.min) && !below(&b.max, &a.min)
}

/// Builds a `Universe` from a catalog snapshot
pub struct UniverseBuilder<'a> {
    snapshot: &'a CatalogSnapshot,
    options: &'a ResolveOptions,
}

/// A `provides` edge of an admitted package
struct Capability {
    provider: ProviderRef,
    range: VersionRange,
}

impl<'a> UniverseBuilder<'a> {
    pub fn new(snapshot: &'a CatalogSnapshot, options: &'a ResolveOptions) -> Self {
        Self { snapshot, options }
    }

    fn platform_label(&self) -> &str {
        self.options.target_platform.as_deref().unwrap_or("none")
    }

    /// Apply the admission filters to one package
    fn admit(
        &self,
        pkg: &Package,
        involved: &InvolvedSet,
        upgrades: &HashMap<&str, &PackageDependency>,
    ) -> Option<Package> {
        if !involved.admits(pkg) {
            debug!("Ignore {} (not involved by request)", pkg.id());
            return None;
        }

        if let Some(platform) = &self.options.target_platform {
            if !pkg.local && !pkg.is_compatible_with(platform) {
                debug!("Ignore {} (incompatible target platform)", pkg.id());
                return None;
            }
        }

        if !self.options.allow_snapshot
            && pkg.is_snapshot()
            && pkg.package_type != PackageType::Studio
            && !involved.is_snapshot_allowed(&pkg.name)
        {
            debug!("Ignore {} (excluded SNAPSHOT)", pkg.id());
            return None;
        }

        if pkg.is_snapshot() && pkg.local {
            let upgrade_matches = upgrades
                .get(pkg.name.as_str())
                .is_some_and(|up| up.range.matches(&pkg.version));
            if upgrade_matches {
                if let Some(remote) = self.snapshot.find_remote(&pkg.id()) {
                    debug!("Upgrade with remote {}", remote.id());
                    let mut substitute = remote.clone();
                    substitute.state = pkg.state;
                    return Some(substitute);
                }
            }
        }

        Some(pkg.clone())
    }

    /// Build the universe and rewrite the request against it
    ///
    /// Fails with `MissingMapping` when a requested name or range has no
    /// admitted version.
    pub fn build(&self, request: &ChangeRequest) -> Result<(Universe, UniverseRequest)> {
        let involved = InvolvedSet::compute(
            self.snapshot.all(),
            request,
            self.options.keep_installed,
        );
        debug!(
            "Involved packages: {:?}",
            involved.names().collect::<Vec<_>>()
        );

        let upgrades: HashMap<&str, &PackageDependency> = request
            .upgrade
            .iter()
            .map(|dep| (dep.name.as_str(), dep))
            .collect();

        let mut admitted: BTreeMap<String, Vec<Package>> = BTreeMap::new();
        for pkg in self.snapshot.all() {
            if let Some(pkg) = self.admit(pkg, &involved, &upgrades) {
                admitted.entry(pkg.name.clone()).or_default().push(pkg);
            }
        }

        // Numbering: ascending version order per name, starting at 1
        let mut numbered: Vec<(Package, u32)> = Vec::new();
        for versions in admitted.values_mut() {
            versions.sort_by(|a, b| a.version.cmp(&b.version));
            for (i, pkg) in versions.drain(..).enumerate() {
                numbered.push((pkg, i as u32 + 1));
            }
        }

        let mut numbering: HashMap<String, Vec<Version>> = HashMap::new();
        let mut capabilities: HashMap<String, Vec<Capability>> = HashMap::new();
        for (pkg, number) in &numbered {
            numbering
                .entry(pkg.name.clone())
                .or_default()
                .push(pkg.version.clone());
            for provided in &pkg.provides {
                capabilities
                    .entry(provided.name.clone())
                    .or_default()
                    .push(Capability {
                        provider: ProviderRef {
                            name: pkg.name.clone(),
                            number: *number,
                        },
                        range: provided.range.clone(),
                    });
            }
        }

        let mapper = RangeMapper {
            numbering: &numbering,
            capabilities: &capabilities,
        };

        let mut universe = Universe {
            involved,
            ..Universe::default()
        };
        for (pkg, number) in numbered {
            let depends = pkg
                .dependencies
                .iter()
                .filter_map(|dep| {
                    let relation = mapper.relation(dep);
                    if relation.is_none() {
                        warn!(
                            "Missing mapping for {} with target platform {} (dependency of {})",
                            dep,
                            self.platform_label(),
                            pkg.id()
                        );
                    }
                    relation
                })
                .collect();

            let conflicts = pkg
                .conflicts
                .iter()
                .filter_map(|conflict| {
                    let mut relation = mapper.relation(conflict);
                    match relation.as_mut() {
                        Some(rel) => rel.providers.retain(|p| p.name != pkg.name),
                        None => debug!(
                            "Missing mapping for {} with target platform {} (conflict of {})",
                            conflict,
                            self.platform_label(),
                            pkg.id()
                        ),
                    }
                    relation
                })
                .collect();

            let provides = pkg
                .provides
                .iter()
                .map(|provided| match mapper.map_range(&provided.name, &provided.range) {
                    Some(range) => Relation::new(provided.name.clone(), range),
                    None => {
                        debug!(
                            "Missing mapping for {} with target platform {} (provided by {}), kept as virtual",
                            provided,
                            self.platform_label(),
                            pkg.id()
                        );
                        Relation::new(provided.name.clone(), IntRange::Any)
                    }
                })
                .collect();

            let installed = pkg.is_installed();
            let index = universe.packages.len();
            universe
                .by_name
                .entry(pkg.name.clone())
                .or_default()
                .push(index);
            universe.packages.push(UniversePackage {
                package: pkg,
                number,
                installed,
                depends,
                conflicts,
                provides,
            });
        }

        let universe_request = UniverseRequest {
            install: self.request_relations(&mapper, &request.install, true)?,
            remove: self.request_relations(&mapper, &request.remove, false)?,
            upgrade: self.request_relations(&mapper, &request.upgrade, false)?,
        };

        debug!(
            "Universe holds {} versions of {} packages",
            universe.len(),
            universe.by_name.len()
        );
        Ok((universe, universe_request))
    }

    fn request_relations(
        &self,
        mapper: &RangeMapper<'_>,
        deps: &[PackageDependency],
        with_providers: bool,
    ) -> Result<Vec<Relation>> {
        deps.iter()
            .map(|dep| {
                let range = mapper
                    .map_range(&dep.name, &dep.range)
                    .filter(|range| !range.is_empty())
                    .ok_or_else(|| {
                        Error::MissingMapping(format!(
                            "Missing mapping for {} with target platform {}",
                            dep,
                            self.platform_label()
                        ))
                    })?;
                let mut relation = Relation::new(dep.name.clone(), range);
                if with_providers {
                    relation.providers = mapper.providers(dep);
                }
                Ok(relation)
            })
            .collect()
    }
}

/// Rewrites version ranges against the integer numbering
struct RangeMapper<'a> {
    /// Admitted versions per name, ascending
    numbering: &'a HashMap<String, Vec<Version>>,
    capabilities: &'a HashMap<String, Vec<Capability>>,
}

impl RangeMapper<'_> {
    /// Integer range for `name`, or `None` when the name has no admitted version
    fn map_range(&self, name: &str, range: &VersionRange) -> Option<IntRange> {
        let versions = self.numbering.get(name)?;
        if range.is_any() {
            return Some(IntRange::Any);
        }

        let matching: Vec<u32> = versions
            .iter()
            .enumerate()
            .filter(|(_, v)| range.matches(v))
            .map(|(i, _)| i as u32 + 1)
            .collect();
        let (Some(&lo), Some(&hi)) = (matching.first(), matching.last()) else {
            return Some(IntRange::Nothing);
        };

        Some(IntRange::from_bounds(
            range.min.as_ref().map(|_| lo),
            range.max.as_ref().map(|_| hi),
        ))
    }

    fn providers(&self, dep: &PackageDependency) -> Vec<ProviderRef> {
        self.capabilities
            .get(&dep.name)
            .into_iter()
            .flatten()
            .filter(|cap| ranges_overlap(&cap.range, &dep.range))
            .map(|cap| cap.provider.clone())
            .collect()
    }

    /// Relation for a dependency or conflict edge
    ///
    /// A name with no admitted version still maps when some admitted
    /// package provides it.
    fn relation(&self, dep: &PackageDependency) -> Option<Relation> {
        let providers = self.providers(dep);
        let range = match self.map_range(&dep.name, &dep.range) {
            Some(range) => range,
            None if !providers.is_empty() => IntRange::Any,
            None => return None,
        };
        Some(Relation {
            name: dep.name.clone(),
            range,
            providers,
        })
    }
}
