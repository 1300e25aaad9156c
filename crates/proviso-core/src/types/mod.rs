//! Core data types for proviso.
//!
//! This module provides the fundamental types used throughout the resolver:
//! - Canonical package names
//! - PEP 440 versions and specifiers
//! - PEP 508 markers and requirements
//! - Candidates, target environments and package metadata

pub mod candidate;
pub mod environment;
pub mod marker;
pub mod name;
pub mod package;
pub mod requirement;
pub mod specifier;
pub mod version;

// Re-export all public types
pub use candidate::Candidate;
pub use environment::Environment;
pub use marker::{MarkerError, MarkerExpression, MarkerOperator, MarkerTree, MarkerValue, MarkerVariable};
pub use name::{canonicalize, Name};
pub use package::PackageMetadata;
pub use requirement::{Requirement, RequirementError};
pub use specifier::{Operator, VersionSpecifier, VersionSpecifiers};
pub use version::{LocalSegment, PreKind, PreRelease, Version, VersionError};
