//! Package index client for proviso
//!
//! This crate provides HTTP client functionality for PEP 691 simple indexes:
//! listing a project's published versions, reading a release's core metadata,
//! with connection pooling, retry logic and a TTL cache of project pages. It
//! also reads the Python release schedule used for default target versions.

pub mod api;
pub mod cache;
pub mod client;
pub mod schedule;

// Re-export main types
pub use api::{parse_core_metadata, DistFilename, DistKind, ProjectFile, ProjectPage};
pub use cache::{CacheEntry, CacheStats, ProjectCache};
pub use client::{parse_index_url, IndexClient, IndexConfig, RetryConfig, DEFAULT_INDEX_URL};
pub use schedule::{ReleaseCycle, ReleaseSchedule};

use proviso_core::ProvisoError;

/// Result type for index operations
pub type IndexResult<T> = Result<T, ProvisoError>;
