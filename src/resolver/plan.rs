// src/resolver/plan.rs

//! Resolution plan data structures
//!
//! A plan is built fresh for every resolution call. Once it is marked
//! succeeded or failed it is sealed and every mutator becomes a no-op
//! returning `false`.

use crate::version::Version;
use std::fmt;

/// A package the plan installs, downloads, or leaves untouched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPackage {
    pub name: String,
    pub version: Version,
    /// Another version of this name is currently installed
    pub is_upgrade: bool,
}

impl PlannedPackage {
    pub fn id(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

/// A package the plan removes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRemoval {
    pub name: String,
    pub version: Version,
    /// Removed because another version of the same name replaces it
    pub is_upgrade_removal: bool,
}

impl PlannedRemoval {
    pub fn id(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

/// Lifecycle of a plan
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlanStatus {
    #[default]
    Pending,
    Succeeded,
    Failed(String),
}

/// Result of dependency resolution
#[derive(Debug, Clone, Default)]
pub struct ResolutionPlan {
    /// Locally available packages to install (new or upgraded)
    install: Vec<PlannedPackage>,
    /// Selected packages that are already installed at that version
    unchanged: Vec<PlannedPackage>,
    /// Packages to fetch from a remote source before installing
    to_download: Vec<PlannedPackage>,
    remove: Vec<PlannedRemoval>,
    /// Package ids in dependency order (dependencies first)
    install_order: Vec<String>,
    status: PlanStatus,
}

impl ResolutionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_sealed(&self) -> bool {
        !matches!(self.status, PlanStatus::Pending)
    }

    /// Whether `name` is already scheduled to end up selected
    fn has_selected(&self, name: &str) -> bool {
        self.install
            .iter()
            .chain(&self.to_download)
            .chain(&self.unchanged)
            .any(|p| p.name == name)
    }

    pub fn add_install(&mut self, name: &str, version: Version, is_upgrade: bool) -> bool {
        if self.is_sealed() || self.has_selected(name) {
            return false;
        }
        self.install.push(PlannedPackage {
            name: name.to_string(),
            version,
            is_upgrade,
        });
        true
    }

    pub fn add_download(&mut self, name: &str, version: Version, is_upgrade: bool) -> bool {
        if self.is_sealed() || self.has_selected(name) {
            return false;
        }
        self.to_download.push(PlannedPackage {
            name: name.to_string(),
            version,
            is_upgrade,
        });
        true
    }

    pub fn add_unchanged(&mut self, name: &str, version: Version) -> bool {
        if self.is_sealed() || self.has_selected(name) {
            return false;
        }
        self.unchanged.push(PlannedPackage {
            name: name.to_string(),
            version,
            is_upgrade: false,
        });
        true
    }

    pub fn mark_for_removal(&mut self, name: &str, version: Version, is_upgrade_removal: bool) -> bool {
        if self.is_sealed() {
            return false;
        }
        if self
            .remove
            .iter()
            .any(|r| r.name == name && r.version == version)
        {
            return false;
        }
        self.remove.push(PlannedRemoval {
            name: name.to_string(),
            version,
            is_upgrade_removal,
        });
        true
    }

    pub fn set_install_order(&mut self, order: Vec<String>) -> bool {
        if self.is_sealed() {
            return false;
        }
        self.install_order = order;
        true
    }

    pub fn mark_succeeded(&mut self) -> bool {
        if self.is_sealed() {
            return false;
        }
        self.status = PlanStatus::Succeeded;
        true
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) -> bool {
        if self.is_sealed() {
            return false;
        }
        self.status = PlanStatus::Failed(message.into());
        true
    }

    pub fn status(&self) -> &PlanStatus {
        &self.status
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, PlanStatus::Succeeded)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, PlanStatus::Failed(_))
    }

    /// Failure message, empty unless the plan failed
    pub fn diagnostic(&self) -> &str {
        match &self.status {
            PlanStatus::Failed(message) => message,
            _ => "",
        }
    }

    pub fn install(&self) -> &[PlannedPackage] {
        &self.install
    }

    pub fn unchanged(&self) -> &[PlannedPackage] {
        &self.unchanged
    }

    pub fn to_download(&self) -> &[PlannedPackage] {
        &self.to_download
    }

    pub fn remove(&self) -> &[PlannedRemoval] {
        &self.remove
    }

    pub fn install_order(&self) -> &[String] {
        &self.install_order
    }

    /// Everything that will be installed, local first then downloads
    pub fn all_to_install(&self) -> impl Iterator<Item = &PlannedPackage> {
        self.install.iter().chain(&self.to_download)
    }

    /// True when applying the plan changes nothing
    pub fn is_noop(&self) -> bool {
        self.install.is_empty() && self.to_download.is_empty() && self.remove.is_empty()
    }
}

impl fmt::Display for ResolutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            PlanStatus::Pending => writeln!(f, "Resolution pending")?,
            PlanStatus::Succeeded => writeln!(f, "Resolution succeeded")?,
            PlanStatus::Failed(message) => return writeln!(f, "Resolution failed: {}", message),
        }

        let section = |f: &mut fmt::Formatter<'_>, title: &str, items: Vec<String>| -> fmt::Result {
            if items.is_empty() {
                return Ok(());
            }
            writeln!(f, "  {} ({}):", title, items.len())?;
            for item in items {
                writeln!(f, "    {}", item)?;
            }
            Ok(())
        };

        let tagged = |p: &PlannedPackage| {
            if p.is_upgrade {
                format!("{} (upgrade)", p.id())
            } else {
                p.id()
            }
        };

        section(f, "install", self.install.iter().map(tagged).collect())?;
        section(f, "download", self.to_download.iter().map(tagged).collect())?;
        section(f, "unchanged", self.unchanged.iter().map(PlannedPackage::id).collect())?;
        section(
            f,
            "remove",
            self.remove
                .iter()
                .map(|r| {
                    if r.is_upgrade_removal {
                        format!("{} (replaced)", r.id())
                    } else {
                        r.id()
                    }
                })
                .collect(),
        )?;
        section(f, "install order", self.install_order.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_rejects_duplicate_selection() {
        let mut plan = ResolutionPlan::new();
        assert!(plan.add_install("a", v("1.0"), false));
        assert!(!plan.add_unchanged("a", v("1.0")));
        assert!(!plan.add_download("a", v("2.0"), true));
        assert!(plan.add_unchanged("b", v("1.0")));
        assert_eq!(plan.install().len(), 1);
    }

    #[test]
    fn test_sealed_after_success() {
        let mut plan = ResolutionPlan::new();
        assert!(plan.add_install("a", v("1.0"), false));
        assert!(plan.mark_succeeded());
        assert!(plan.is_success());
        assert!(!plan.add_install("b", v("1.0"), false));
        assert!(!plan.mark_for_removal("a", v("0.9"), true));
        assert!(!plan.mark_failed("late"));
        assert_eq!(plan.diagnostic(), "");
    }

    #[test]
    fn test_failed_plan_diagnostic() {
        let mut plan = ResolutionPlan::new();
        assert!(plan.mark_failed("no solution"));
        assert!(plan.is_failed());
        assert_eq!(plan.diagnostic(), "no solution");
        assert!(!plan.mark_succeeded());
        assert!(plan.to_string().contains("no solution"));
    }

    #[test]
    fn test_removal_dedup() {
        let mut plan = ResolutionPlan::new();
        assert!(plan.mark_for_removal("a", v("1.0"), false));
        assert!(!plan.mark_for_removal("a", v("1.0"), true));
        assert!(plan.mark_for_removal("a", v("1.1"), false));
        assert_eq!(plan.remove().len(), 2);
    }

    #[test]
    fn test_display_lists_sections() {
        let mut plan = ResolutionPlan::new();
        plan.add_install("a", v("2.0"), true);
        plan.add_download("b", v("1.0"), false);
        plan.mark_for_removal("a", v("1.0"), true);
        plan.mark_succeeded();

        let text = plan.to_string();
        assert!(text.contains("a-2.0 (upgrade)"));
        assert!(text.contains("download (1)"));
        assert!(text.contains("a-1.0 (replaced)"));
        assert!(!text.contains("unchanged"));
    }
}
