//! PEP 508 dependency requirements.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::candidate::Candidate;
use super::environment::Environment;
use super::marker::MarkerTree;
use super::name::{canonicalize, Name};
use super::specifier::VersionSpecifiers;

/// Requirement parsing error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid requirement '{input}': {reason}")]
pub struct RequirementError {
    pub input: String,
    pub reason: String,
}

/// A named version constraint (`name[extra,...] specifiers ; marker`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Requirement {
    pub name: Name,
    pub extras: BTreeSet<String>,
    pub specifier: VersionSpecifiers,
    pub marker: Option<MarkerTree>,
}

impl Requirement {
    /// Create an unconstrained requirement on `name`
    pub fn new(name: Name) -> Self {
        Self {
            name,
            extras: BTreeSet::new(),
            specifier: VersionSpecifiers::empty(),
            marker: None,
        }
    }

    /// Check if a candidate satisfies this requirement.
    ///
    /// The candidate must carry at least the requested extras.
    pub fn is_satisfied_by(&self, candidate: &Candidate) -> bool {
        self.name == candidate.name
            && self.specifier.contains(&candidate.version)
            && self.extras.is_subset(&candidate.extras)
    }

    /// Check if this top-level requirement applies to an environment.
    ///
    /// Clauses on `extra` are treated as satisfied.
    pub fn applies_to(&self, env: &Environment) -> bool {
        self.marker
            .as_ref()
            .map_or(true, |marker| marker.evaluate_ignoring_extra(env))
    }

    /// Check if any clause opts this requirement into pre-releases
    pub fn mentions_prerelease(&self) -> bool {
        self.specifier.mentions_prerelease()
    }
}

impl FromStr for Requirement {
    type Err = RequirementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = |reason: String| RequirementError {
            input: s.to_string(),
            reason,
        };

        let (head, marker) = match s.split_once(';') {
            Some((head, marker)) => (head, Some(marker.trim())),
            None => (s, None),
        };
        let head = head.trim();

        let name_end = head
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
            .unwrap_or(head.len());
        let name = Name::new(&head[..name_end])
            .map_err(|_| error("expected a package name".to_string()))?;
        let mut rest = head[name_end..].trim_start();

        let mut extras = BTreeSet::new();
        if let Some(after) = rest.strip_prefix('[') {
            let (list, tail) = after
                .split_once(']')
                .ok_or_else(|| error("unclosed extras list".to_string()))?;
            for extra in list.split(',').map(str::trim).filter(|extra| !extra.is_empty()) {
                if !Name::is_valid(extra) {
                    return Err(error(format!("invalid extra '{}'", extra)));
                }
                extras.insert(canonicalize(extra));
            }
            rest = tail.trim_start();
        }

        if rest.starts_with('@') {
            return Err(error("direct URL requirements are not supported".to_string()));
        }

        let rest = rest
            .strip_prefix('(')
            .and_then(|inner| inner.strip_suffix(')'))
            .unwrap_or(rest);
        let specifier = rest.parse().map_err(|e| error(format!("{}", e)))?;

        let marker = match marker {
            Some("") => return Err(error("empty marker after ';'".to_string())),
            Some(marker) => Some(marker.parse().map_err(|e| error(format!("{}", e)))?),
            None => None,
        };

        Ok(Self {
            name,
            extras,
            specifier,
            marker,
        })
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            let extras: Vec<&str> = self.extras.iter().map(String::as_str).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        write!(f, "{}", self.specifier)?;
        if let Some(marker) = &self.marker {
            write!(f, "; {}", marker)?;
        }
        Ok(())
    }
}

impl TryFrom<String> for Requirement {
    type Error = RequirementError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Requirement> for String {
    fn from(requirement: Requirement) -> Self {
        requirement.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Version;

    fn req(s: &str) -> Requirement {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_full_requirement() {
        let requirement = req("Requests[Socks, security] >=2.0,<3 ; python_version >= '3.8'");
        assert_eq!(requirement.name.as_str(), "requests");
        assert_eq!(
            requirement.extras.iter().cloned().collect::<Vec<_>>(),
            vec!["security".to_string(), "socks".to_string()]
        );
        assert_eq!(requirement.specifier.to_string(), ">=2.0,<3");
        assert!(requirement.marker.is_some());
        assert_eq!(
            requirement.to_string(),
            "requests[security,socks]>=2.0,<3; python_version >= \"3.8\""
        );
    }

    #[test]
    fn test_parse_bare_and_parenthesized() {
        let requirement = req("six");
        assert!(requirement.specifier.is_empty());
        assert!(requirement.marker.is_none());

        let requirement = req("urllib3 (>=1.21.1, <1.27)");
        assert_eq!(requirement.specifier.to_string(), ">=1.21.1,<1.27");
    }

    #[test]
    fn test_invalid_requirements() {
        for input in [
            "",
            ">=1.0",
            "pkg[extra",
            "pkg @ https://example.com/pkg.whl",
            "pkg >=",
            "pkg; ",
            "pkg; bogus == '1'",
        ] {
            assert!(input.parse::<Requirement>().is_err(), "{:?} should fail", input);
        }
    }

    #[test]
    fn test_is_satisfied_by() {
        let requirement = req("pkg[security]>=1.0");
        let plain = Candidate::new(Name::new("pkg").unwrap(), "1.5".parse::<Version>().unwrap());
        let with_extra = plain.clone().with_extras(["security".to_string()]);

        assert!(!requirement.is_satisfied_by(&plain));
        assert!(requirement.is_satisfied_by(&with_extra));
        assert!(req("pkg>=1.0").is_satisfied_by(&with_extra));
        assert!(!req("pkg>=2.0").is_satisfied_by(&with_extra));
        assert!(!req("other").is_satisfied_by(&plain));
    }

    #[test]
    fn test_applies_to_ignores_extra() {
        let env = Environment::new("3.7", [("python_version", "3.7")]);
        assert!(req("pkg; extra == 'dev'").applies_to(&env));
        assert!(req("pkg; python_version < '3.8'").applies_to(&env));
        assert!(!req("pkg; python_version >= '3.8'").applies_to(&env));
    }
}
