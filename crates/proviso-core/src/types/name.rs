//! Canonical package names.
//!
//! Package names compare case-insensitively and treat runs of `-`, `_` and
//! `.` as a single separator, so `My_Package.Name` and `my-package-name`
//! are the same package.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ProvisoError;

/// Package identifier in canonical form
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Name(String);

impl Name {
    /// Validate and canonicalize a package name
    pub fn new(input: &str) -> Result<Self, ProvisoError> {
        let trimmed = input.trim();
        if !Self::is_valid(trimmed) {
            return Err(ProvisoError::InvalidName {
                input: input.to_string(),
            });
        }
        Ok(Self(canonicalize(trimmed)))
    }

    /// Check if this is a valid distribution name
    pub fn is_valid(name: &str) -> bool {
        let bytes = name.as_bytes();
        match (bytes.first(), bytes.last()) {
            (Some(first), Some(last)) => {
                first.is_ascii_alphanumeric()
                    && last.is_ascii_alphanumeric()
                    && bytes
                        .iter()
                        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
            },
            _ => false,
        }
    }

    /// Get the canonical form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Lower-case a name and collapse separator runs into a single `-`
pub fn canonicalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_separator = false;

    for c in input.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            pending_separator = true;
            continue;
        }
        if pending_separator && !out.is_empty() {
            out.push('-');
        }
        pending_separator = false;
        out.push(c.to_ascii_lowercase());
    }

    out
}

impl FromStr for Name {
    type Err = ProvisoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Name {
    type Error = ProvisoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Name> for String {
    fn from(name: Name) -> Self {
        name.0
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalizes_name() {
        let name = Name::new("My_Package.Name").unwrap();
        assert_eq!(name.as_str(), "my-package-name");

        let name = Name::new("zope..interface").unwrap();
        assert_eq!(name.as_str(), "zope-interface");
    }

    #[test]
    fn test_equivalent_spellings_are_equal() {
        assert_eq!(Name::new("Django").unwrap(), Name::new("django").unwrap());
        assert_eq!(
            Name::new("typing_extensions").unwrap(),
            Name::new("typing-extensions").unwrap()
        );
    }

    #[test]
    fn test_valid_names() {
        assert!(Name::is_valid("requests"));
        assert!(Name::is_valid("a"));
        assert!(Name::is_valid("backports.zoneinfo"));

        assert!(!Name::is_valid(""));
        assert!(!Name::is_valid("-leading"));
        assert!(!Name::is_valid("trailing."));
        assert!(!Name::is_valid("has space"));
        assert!(Name::new("bad@name").is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let name: Name = serde_json::from_str("\"Flask_Login\"").unwrap();
        assert_eq!(name.as_str(), "flask-login");
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"flask-login\"");
    }
}
