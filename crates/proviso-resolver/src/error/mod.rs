//! Resolution failures
//!
//! A failed resolution reports one of four kinds: no assignment exists, the
//! index could not be reached, the search exceeded its round budget, or the
//! environment's time budget elapsed.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use proviso_core::{Candidate, Name, ProvisoError, Requirement};

/// A requirement together with the candidate that introduced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementInformation {
    pub requirement: Requirement,
    /// `None` for top-level requirements
    pub parent: Option<Candidate>,
}

impl RequirementInformation {
    /// A top-level requirement
    pub fn root(requirement: Requirement) -> Self {
        Self {
            requirement,
            parent: None,
        }
    }

    /// A dependency edge of `parent`
    pub fn from_parent(requirement: Requirement, parent: Candidate) -> Self {
        Self {
            requirement,
            parent: Some(parent),
        }
    }

    /// Same requirement from the same release, ignoring the parent's extras
    pub fn same_origin(&self, other: &Self) -> bool {
        self.requirement == other.requirement
            && match (&self.parent, &other.parent) {
                (None, None) => true,
                (Some(a), Some(b)) => a.same_release(b),
                _ => false,
            }
    }
}

impl fmt::Display for RequirementInformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent {
            Some(parent) => write!(f, "{} (from {})", self.requirement, parent),
            None => write!(f, "{} (from root)", self.requirement),
        }
    }
}

/// Why a resolution failed
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("No version of '{name}' satisfies all requirements:{}{}", list_causes(.causes), describe_conflict(.conflict))]
    Exhausted {
        /// The package whose candidates ran out
        name: Name,
        /// Every requirement active on it at the final failure
        causes: Vec<RequirementInformation>,
        /// The last requirement that collided with a pinned candidate
        conflict: Option<RequirementInformation>,
    },

    #[error("Package index unavailable: {source}")]
    SupplyUnavailable {
        #[source]
        source: ProvisoError,
    },

    #[error("Resolution too complex: gave up after {rounds} rounds")]
    TooComplex { rounds: usize },

    #[error("Resolution timed out after {}s", .elapsed.as_secs())]
    TimedOut { elapsed: Duration },

    #[error("Resolution task was cancelled before finishing")]
    Cancelled,
}

/// Failure category, for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Exhausted,
    SupplyUnavailable,
    TooComplex,
    TimedOut,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorKind::Exhausted => "conflict",
            ErrorKind::SupplyUnavailable => "index unavailable",
            ErrorKind::TooComplex => "too complex",
            ErrorKind::TimedOut => "timed out",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

impl ResolutionError {
    /// Wrap an index failure
    pub fn unavailable(source: ProvisoError) -> Self {
        Self::SupplyUnavailable { source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolutionError::Exhausted { .. } => ErrorKind::Exhausted,
            ResolutionError::SupplyUnavailable { .. } => ErrorKind::SupplyUnavailable,
            ResolutionError::TooComplex { .. } => ErrorKind::TooComplex,
            ResolutionError::TimedOut { .. } => ErrorKind::TimedOut,
            ResolutionError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Get a user-friendly suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            ResolutionError::Exhausted { .. } => {
                Some("Relax one of the listed requirements or drop the target version that needs it")
            },
            ResolutionError::SupplyUnavailable { source } => source.suggestion(),
            ResolutionError::TooComplex { .. } => {
                Some("Add tighter lower bounds to your requirements or raise max-rounds")
            },
            ResolutionError::TimedOut { .. } => Some("Raise the timeout or check index latency"),
            ResolutionError::Cancelled => None,
        }
    }
}

fn list_causes(causes: &[RequirementInformation]) -> String {
    causes.iter().map(|cause| format!("\n  {}", cause)).collect()
}

fn describe_conflict(conflict: &Option<RequirementInformation>) -> String {
    match conflict {
        Some(conflict) => format!("\nlast conflict: {}", conflict),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, version: &str) -> Candidate {
        Candidate::new(Name::new(name).unwrap(), version.parse().unwrap())
    }

    #[test]
    fn test_exhausted_message_lists_causes() {
        let error = ResolutionError::Exhausted {
            name: Name::new("c").unwrap(),
            causes: vec![
                RequirementInformation::from_parent("c==1.0".parse().unwrap(), candidate("a", "2.0")),
                RequirementInformation::root("c>=2".parse().unwrap()),
            ],
            conflict: None,
        };

        assert_eq!(
            error.to_string(),
            "No version of 'c' satisfies all requirements:\n  c==1.0 (from a==2.0)\n  c>=2 (from root)"
        );
        assert_eq!(error.kind(), ErrorKind::Exhausted);
        assert!(error.suggestion().is_some());
    }

    #[test]
    fn test_same_origin_ignores_parent_extras() {
        let plain = RequirementInformation::from_parent("x>=1".parse().unwrap(), candidate("a", "1.0"));
        let widened = RequirementInformation::from_parent(
            "x>=1".parse().unwrap(),
            candidate("a", "1.0").with_extras(["extra".to_string()]),
        );
        assert!(plain.same_origin(&widened));
        assert!(!plain.same_origin(&RequirementInformation::root("x>=1".parse().unwrap())));
    }

    #[test]
    fn test_timeout_message() {
        let error = ResolutionError::TimedOut {
            elapsed: Duration::from_secs(30),
        };
        assert_eq!(error.to_string(), "Resolution timed out after 30s");
        assert_eq!(error.kind().to_string(), "timed out");
    }
}
