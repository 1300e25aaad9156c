//! Error types and result aliases for proviso operations.
//!
//! Provides a unified error type that covers the error conditions of the
//! index client, configuration loading and input parsing, with actionable
//! error messages. Resolution failures live in `proviso-resolver`.

use thiserror::Error;

use crate::types::{MarkerError, RequirementError, VersionError};

/// Unified error type for all proviso operations
#[derive(Error, Debug)]
pub enum ProvisoError {
    // Input errors
    #[error("Invalid version '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },

    #[error("Invalid version specifier '{input}': {reason}")]
    InvalidSpecifier { input: String, reason: String },

    #[error("Invalid marker '{input}': {reason}")]
    InvalidMarker { input: String, reason: String },

    #[error("Invalid requirement '{input}': {reason}")]
    InvalidRequirement { input: String, reason: String },

    #[error("Invalid package name '{input}'")]
    InvalidName { input: String },

    // Index errors
    #[error("Package '{name}' not found in any configured index")]
    PackageNotFound { name: String },

    #[error("Package index unavailable: {message}")]
    SupplyUnavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Config errors
    #[error("Failed to parse {file}: {message}")]
    TomlParse { file: String, message: String },

    #[error("Configuration field '{field}' is invalid: {reason}")]
    ConfigValidation { field: String, reason: String },

    // IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for proviso operations
pub type ProvisoResult<T> = Result<T, ProvisoError>;

impl ProvisoError {
    /// Create an index error from any error type
    pub fn unavailable<E>(message: String, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::SupplyUnavailable {
            message,
            source: Some(Box::new(source)),
        }
    }

    /// Create an IO error from std::io::Error
    pub fn io(message: String, source: std::io::Error) -> Self {
        Self::Io { message, source }
    }

    /// Create a configuration validation error
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error is recoverable by retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProvisoError::SupplyUnavailable { .. } | ProvisoError::Io { .. })
    }

    /// Check if this error reports a missing package
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProvisoError::PackageNotFound { .. })
    }

    /// Get a user-friendly suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            ProvisoError::PackageNotFound { .. } => {
                Some("Check the package name spelling and the configured index URLs")
            },
            ProvisoError::SupplyUnavailable { .. } => {
                Some("Check your internet connection and the index URL, then try again")
            },
            ProvisoError::InvalidRequirement { .. } | ProvisoError::InvalidSpecifier { .. } => {
                Some("Requirements follow PEP 508, e.g. 'requests[socks]>=2.0; python_version >= \"3.8\"'")
            },
            ProvisoError::InvalidMarker { .. } => {
                Some("Markers follow PEP 508, e.g. 'python_version >= \"3.8\" and sys_platform == \"linux\"'")
            },
            ProvisoError::TomlParse { .. } => Some("Fix the TOML syntax at the reported location"),
            _ => None,
        }
    }
}

impl From<VersionError> for ProvisoError {
    fn from(error: VersionError) -> Self {
        match error {
            VersionError::InvalidVersion { input, reason } => Self::InvalidVersion { input, reason },
            VersionError::InvalidSpecifier { input, reason } => {
                Self::InvalidSpecifier { input, reason }
            },
        }
    }
}

impl From<MarkerError> for ProvisoError {
    fn from(error: MarkerError) -> Self {
        Self::InvalidMarker {
            input: error.input,
            reason: error.reason,
        }
    }
}

impl From<RequirementError> for ProvisoError {
    fn from(error: RequirementError) -> Self {
        Self::InvalidRequirement {
            input: error.input,
            reason: error.reason,
        }
    }
}
