// src/error.rs

//! Error types for addonpm
//!
//! Every failure a resolution call can surface is one variant here.
//! Recoverable conditions (unknown dependency names, unmapped solution
//! entries) are logged where they happen and never reach this type.

use crate::config::ConfigError;
use crate::resolver::ResolutionPlan;
use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A version string could not be parsed
    #[error("Malformed version: {0}")]
    MalformedVersion(String),

    /// A `name[:min[:max]]` dependency string could not be parsed
    #[error("Malformed dependency: {0}")]
    MalformedDependency(String),

    /// A requested package/range has no admitted version in the universe
    #[error("Missing mapping: {0}")]
    MissingMapping(String),

    /// The oracle found no solution; the failed plan carries the diagnostic
    #[error("Dependency resolution failed: {}", .0.diagnostic())]
    Unresolvable(Box<ResolutionPlan>),

    /// The solver was cancelled or ran past its deadline
    #[error("Resolution cancelled: {0}")]
    Cancelled(String),

    /// A package or source lookup came back empty
    #[error("Not found: {0}")]
    NotFound(String),

    /// A package source failed to produce its listing
    #[error("Package source error: {0}")]
    Source(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// True for the two failures callers see as a `DependencyException`
    pub fn is_dependency_failure(&self) -> bool {
        matches!(self, Error::MissingMapping(_) | Error::Unresolvable(_))
    }

    /// The failed plan, when the oracle reported infeasibility
    pub fn failed_plan(&self) -> Option<&ResolutionPlan> {
        match self {
            Error::Unresolvable(plan) => Some(plan.as_ref()),
            _ => None,
        }
    }
}
