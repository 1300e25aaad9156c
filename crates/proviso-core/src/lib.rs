//! # proviso-core
//!
//! Core types shared across all proviso crates.
//!
//! This crate provides:
//! - `Name`, the canonical package identifier
//! - PEP 440 `Version` and `VersionSpecifiers`
//! - PEP 508 `MarkerTree` and `Requirement`
//! - `Candidate`, `Environment` and `PackageMetadata` used by the resolver
//! - `ProvisoError` for unified error handling
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `types`: Core data types (Version, Requirement, etc.)
//! - `error`: Error types and result aliases

pub mod error;
pub mod types;

// Re-export commonly used types
pub use error::{ProvisoError, ProvisoResult};
pub use types::{
    Candidate, Environment, MarkerTree, Name, PackageMetadata, Requirement, Version,
    VersionSpecifier, VersionSpecifiers,
};
