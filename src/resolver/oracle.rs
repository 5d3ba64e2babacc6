// src/resolver/oracle.rs

//! Oracle contract
//!
//! An oracle takes a universe and a request and either selects the set of
//! (name, number) pairs forming the target state, or reports that no such
//! set exists. Its answer is classified against the installed state of the
//! universe before the driver interprets it.

use super::universe::{Universe, UniverseRequest};
use crate::error::Result;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Shared flag a caller flips to stop a running solve
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Bound on a single oracle call
#[derive(Debug, Clone, Default)]
pub struct SolveBudget {
    pub deadline: Option<Instant>,
    pub token: CancellationToken,
}

impl SolveBudget {
    /// No deadline, never cancelled unless the token is flipped
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            token: CancellationToken::new(),
        }
    }

    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        timeout.map(Self::with_timeout).unwrap_or_default()
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Why the solve must stop, if it must
    pub fn exhausted(&self) -> Option<&'static str> {
        if self.token.is_cancelled() {
            Some("cancelled by caller")
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some("deadline exceeded")
        } else {
            None
        }
    }
}

/// How a solution entry relates to the installed state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryStatus {
    /// Selected, no version of the name installed
    New,
    /// Selected, a different version of the name installed
    VersionChanged,
    /// Installed, not selected
    Removed,
    /// Selected and already installed
    Unchanged,
}

impl EntryStatus {
    pub fn as_str(&self) -> &str {
        match self {
            EntryStatus::New => "new",
            EntryStatus::VersionChanged => "version-changed",
            EntryStatus::Removed => "removed",
            EntryStatus::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified (name, number) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionEntry {
    pub name: String,
    pub number: u32,
    pub status: EntryStatus,
}

/// A classified oracle answer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Solution {
    pub entries: Vec<SolutionEntry>,
    /// The oracle proved this is its best answer
    pub optimal: bool,
}

impl Solution {
    /// Classify a selection against the universe's installed packages
    ///
    /// Selected pairs become new, version-changed, or unchanged entries.
    /// Every installed pair that was not selected becomes a removed entry.
    /// Entries come out sorted by name, then number.
    pub fn classify(universe: &Universe, selected: &[(String, u32)], optimal: bool) -> Self {
        let selected: BTreeSet<(&str, u32)> =
            selected.iter().map(|(name, n)| (name.as_str(), *n)).collect();
        let mut entries = Vec::new();

        for &(name, number) in &selected {
            let installed: Vec<u32> = universe.installed_of(name).map(|p| p.number).collect();
            let status = if installed.contains(&number) {
                EntryStatus::Unchanged
            } else if installed.is_empty() {
                EntryStatus::New
            } else {
                EntryStatus::VersionChanged
            };
            entries.push(SolutionEntry {
                name: name.to_string(),
                number,
                status,
            });
        }

        for pkg in universe.packages().iter().filter(|p| p.installed) {
            if !selected.contains(&(pkg.name(), pkg.number)) {
                entries.push(SolutionEntry {
                    name: pkg.name().to_string(),
                    number: pkg.number,
                    status: EntryStatus::Removed,
                });
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name).then(a.number.cmp(&b.number)));
        Self { entries, optimal }
    }

    /// Entries with the given status
    pub fn with_status(&self, status: EntryStatus) -> impl Iterator<Item = &SolutionEntry> {
        self.entries.iter().filter(move |e| e.status == status)
    }

    /// The selected number for `name`, if any version of it is selected
    pub fn selected_number(&self, name: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| e.name == name && e.status != EntryStatus::Removed)
            .map(|e| e.number)
    }
}

/// Result of one oracle call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleOutcome {
    Solved(Solution),
    /// Infeasible, with a human-readable explanation
    NoSolution(String),
}

/// Something that can solve a universe
///
/// Implementations must honor the budget: once it is exhausted the call
/// returns `Error::Cancelled` instead of a partial answer.
pub trait Oracle {
    fn solve(
        &self,
        universe: &Universe,
        request: &UniverseRequest,
        budget: &SolveBudget,
    ) -> Result<OracleOutcome>;
}
