//! Declared metadata of one release.
//!
//! `PackageMetadata` holds what the resolver needs from a core-metadata
//! document or a `[project]` table: the dependency edges, the supported
//! Python range and the declared extras.

use serde::{Deserialize, Serialize};

use super::environment::Environment;
use super::name::{canonicalize, Name};
use super::requirement::Requirement;
use super::specifier::VersionSpecifiers;
use super::version::Version;

/// Dependency metadata for a single release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: Name,
    pub version: Option<Version>,
    pub requires_python: Option<VersionSpecifiers>,
    pub requires_dist: Vec<Requirement>,
    pub provides_extra: Vec<String>,
}

impl PackageMetadata {
    /// Create metadata with no declared edges
    pub fn new(name: Name, version: Option<Version>) -> Self {
        Self {
            name,
            version,
            requires_python: None,
            requires_dist: Vec::new(),
            provides_extra: Vec::new(),
        }
    }

    /// Add a dependency edge
    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requires_dist.push(requirement);
        self
    }

    /// Set the supported Python range
    pub fn with_requires_python(mut self, requires_python: VersionSpecifiers) -> Self {
        self.requires_python = Some(requires_python);
        self
    }

    /// Check if the environment's interpreter satisfies `Requires-Python`.
    ///
    /// Environments without a parseable interpreter version are accepted.
    pub fn is_python_compatible(&self, env: &Environment) -> bool {
        match (&self.requires_python, env.python_full_version()) {
            (Some(requires_python), Some(python)) => requires_python.contains(&python),
            _ => true,
        }
    }

    /// Extras declared by `Provides-Extra` or referenced by an edge's marker
    pub fn declared_extras(&self) -> Vec<String> {
        let mut extras: Vec<String> = self
            .provides_extra
            .iter()
            .map(|extra| canonicalize(extra))
            .chain(
                self.requires_dist
                    .iter()
                    .filter_map(|requirement| requirement.marker.as_ref())
                    .flat_map(|marker| marker.extra_names()),
            )
            .collect();
        extras.sort();
        extras.dedup();
        extras
    }

    /// The requirements a project needs when `extras` are selected.
    ///
    /// Includes every edge whose marker does not mention `extra`, plus the
    /// edges whose `extra` clauses hold for one of the selected extras.
    /// Environment clauses are left for the resolver to evaluate per target.
    pub fn requirements_for_extras(&self, extras: &[String]) -> Vec<Requirement> {
        self.requires_dist
            .iter()
            .filter(|requirement| match &requirement.marker {
                None => true,
                Some(marker) if !marker.references_extra() => true,
                Some(marker) => extras.iter().any(|extra| marker.holds_for_extra(extra)),
            })
            .cloned()
            .collect()
    }
}
