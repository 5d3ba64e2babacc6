// src/lib.rs

//! addonpm: add-on package resolution
//!
//! Tracks locally installed add-ons, discovers remotely available ones,
//! and computes consistent install/upgrade/remove plans across versions,
//! dependencies, conflicts and `provides` relationships.
//!
//! # Architecture
//!
//! - Catalog: package sources merged into views and immutable snapshots
//! - Involved set: the names a request can possibly touch
//! - Universe: admitted versions numbered per name, edges as integer ranges
//! - Oracle: a SAT solver (resolvo) selecting the target state
//! - Plan: install, download, unchanged and remove categories plus an
//!   install order

pub mod catalog;
pub mod config;
mod error;
pub mod package;
pub mod resolver;
pub mod version;

pub use catalog::{Catalog, CatalogSnapshot, PackageSource};
pub use config::{ConfigError, ResolverConfig, SourceConfig, SourceKind};
pub use error::{Error, Result};
pub use package::{Package, PackageState, PackageType};
pub use resolver::{
    PackageRequest, ResolutionPlan, ResolveOptions, ResolveRequest, Resolver, SolveBudget,
};
pub use version::{PackageDependency, Version, VersionRange};
