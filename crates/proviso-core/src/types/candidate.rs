//! Resolution candidates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::name::{canonicalize, Name};
use super::version::Version;

/// A concrete (package, version, activated extras) choice
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub name: Name,
    pub version: Version,
    pub extras: BTreeSet<String>,
}

impl Candidate {
    /// Create a candidate with no extras
    pub fn new(name: Name, version: Version) -> Self {
        Self {
            name,
            version,
            extras: BTreeSet::new(),
        }
    }

    /// Activate extras, normalized like package names
    pub fn with_extras(mut self, extras: impl IntoIterator<Item = String>) -> Self {
        self.extras
            .extend(extras.into_iter().map(|extra| canonicalize(&extra)));
        self
    }

    /// Check if this is the same release as `other`, ignoring extras
    pub fn same_release(&self, other: &Candidate) -> bool {
        self.name == other.name && self.version == other.version
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            let extras: Vec<&str> = self.extras.iter().map(String::as_str).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        write!(f, "=={}", self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_identity() {
        let name = Name::new("pkg").unwrap();
        let version: Version = "1.0".parse().unwrap();
        let plain = Candidate::new(name.clone(), version.clone());
        let extra = Candidate::new(name, version).with_extras(["Security".to_string()]);

        assert_eq!(plain.to_string(), "pkg==1.0");
        assert_eq!(extra.to_string(), "pkg[security]==1.0");
        assert_ne!(plain, extra);
        assert!(plain.same_release(&extra));
        assert!(plain < extra);
    }
}
