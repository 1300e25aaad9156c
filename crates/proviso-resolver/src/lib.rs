//! Dependency resolution engine for proviso
//!
//! This crate provides backtracking resolution of Python requirements over a
//! memoized candidate supply, and runs it across several target environments
//! at once, merging the per-environment results.

pub mod engine;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod selector;
pub mod supply;

// Re-export main types
pub use engine::{Resolution, Resolver, DEFAULT_MAX_ROUNDS};
pub use error::{ErrorKind, RequirementInformation, ResolutionError};
pub use memory::MemoryIndex;
pub use orchestrator::{EnvironmentFailure, MultiResolution, Orchestrator, OrchestratorOptions};
pub use selector::VersionSelector;
pub use supply::{CandidateSupply, PackageIndex, SupplyStats};

/// Result type for resolver operations
pub type ResolverResult<T> = Result<T, ResolutionError>;
