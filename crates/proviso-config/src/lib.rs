//! Configuration parsing for proviso
//!
//! This crate reads a project's static metadata from `pyproject.toml` and
//! layers proviso's settings from built-in defaults, the global config file,
//! the project's `[tool.proviso]` table, environment variables and CLI flags.

pub mod merge;
pub mod pyproject;

// Re-export main types
pub use merge::{ConfigLayering, ConfigLoader, ConfigSource, Settings};
pub use pyproject::{ProjectTable, PyProject, ToolSettings};

use proviso_core::ProvisoError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ProvisoError>;
