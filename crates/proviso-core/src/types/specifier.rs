//! PEP 440 version specifiers.
//!
//! A `VersionSpecifiers` value is a comma-separated conjunction of clauses
//! such as `>=1.0, !=1.3.*, <2`. The empty conjunction admits every version.
//! Specifiers never exclude pre-releases on their own; that policy belongs to
//! candidate enumeration in the resolver.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::version::{Version, VersionError};

/// Comparison operator of a single clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operator {
    Equal,            // ==1.0
    EqualStar,        // ==1.0.*
    NotEqual,         // !=1.0
    NotEqualStar,     // !=1.0.*
    LessThan,         // <1.0
    LessThanEqual,    // <=1.0
    GreaterThan,      // >1.0
    GreaterThanEqual, // >=1.0
    Compatible,       // ~=1.0
    ArbitraryEqual,   // ===1.0
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equal | Operator::EqualStar => "==",
            Operator::NotEqual | Operator::NotEqualStar => "!=",
            Operator::LessThan => "<",
            Operator::LessThanEqual => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanEqual => ">=",
            Operator::Compatible => "~=",
            Operator::ArbitraryEqual => "===",
        }
    }
}

/// One clause (`>=1.0`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionSpecifier {
    operator: Operator,
    version: Version,
    /// Operand as written, compared verbatim by `===`
    literal: String,
}

/// Conjunction of clauses (`>=1.0,<2`)
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionSpecifiers(Vec<VersionSpecifier>);

impl VersionSpecifier {
    /// Create a clause from an operator and a version
    pub fn new(operator: Operator, version: Version) -> Self {
        let literal = version.to_string();
        Self {
            operator,
            version,
            literal,
        }
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Check if `version` satisfies this clause
    pub fn contains(&self, version: &Version) -> bool {
        match self.operator {
            Operator::Equal => {
                if self.version.is_local() {
                    *version == self.version
                } else {
                    version.without_local() == self.version
                }
            },
            Operator::NotEqual => {
                !VersionSpecifier::new(Operator::Equal, self.version.clone()).contains(version)
            },
            Operator::EqualStar => self.prefix_matches(version, self.version.release()),
            Operator::NotEqualStar => !self.prefix_matches(version, self.version.release()),
            Operator::LessThanEqual => version.without_local() <= self.version,
            Operator::GreaterThanEqual => version.without_local() >= self.version,
            Operator::LessThan => {
                let candidate = version.without_local();
                if candidate >= self.version {
                    return false;
                }
                // `<3.0` must not admit `3.0rc1`
                !(!self.version.is_prerelease()
                    && candidate.is_prerelease()
                    && candidate.base() == self.version.base())
            },
            Operator::GreaterThan => {
                if *version <= self.version {
                    return false;
                }
                // `>3.0` must not admit `3.0.post1` or `3.0+local`
                let same_base = version.base() == self.version.base();
                if same_base && !self.version.is_postrelease() && version.is_postrelease() {
                    return false;
                }
                !(same_base && version.is_local())
            },
            Operator::Compatible => {
                let release = self.version.release();
                version.without_local() >= self.version
                    && self.prefix_matches(version, &release[..release.len() - 1])
            },
            Operator::ArbitraryEqual => version.to_string().eq_ignore_ascii_case(&self.literal),
        }
    }

    /// Check if this clause names a pre-release as an inclusive bound.
    ///
    /// Such a clause opts its package into pre-release candidates.
    pub fn mentions_prerelease(&self) -> bool {
        matches!(
            self.operator,
            Operator::Equal
                | Operator::LessThanEqual
                | Operator::GreaterThanEqual
                | Operator::Compatible
                | Operator::ArbitraryEqual
                | Operator::LessThan
                | Operator::GreaterThan
        ) && self.version.is_prerelease()
    }

    fn prefix_matches(&self, version: &Version, prefix: &[u64]) -> bool {
        version.epoch() == self.version.epoch()
            && prefix
                .iter()
                .enumerate()
                .all(|(i, segment)| version.release_at(i) == *segment)
    }
}

impl FromStr for VersionSpecifier {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();

        // Longest operators first
        let (operator, operand) = [
            ("===", Operator::ArbitraryEqual),
            ("~=", Operator::Compatible),
            ("==", Operator::Equal),
            ("!=", Operator::NotEqual),
            ("<=", Operator::LessThanEqual),
            (">=", Operator::GreaterThanEqual),
            ("<", Operator::LessThan),
            (">", Operator::GreaterThan),
        ]
        .into_iter()
        .find_map(|(token, operator)| {
            input
                .strip_prefix(token)
                .map(|operand| (operator, operand.trim()))
        })
        .ok_or_else(|| VersionError::specifier(s, "missing comparison operator"))?;

        if operand.is_empty() {
            return Err(VersionError::specifier(s, "missing version"));
        }

        if operator == Operator::ArbitraryEqual {
            let version = operand.parse().unwrap_or_default();
            return Ok(Self {
                operator,
                version,
                literal: operand.to_string(),
            });
        }

        let (operator, operand) = match (operator, operand.strip_suffix(".*")) {
            (Operator::Equal, Some(prefix)) => (Operator::EqualStar, prefix),
            (Operator::NotEqual, Some(prefix)) => (Operator::NotEqualStar, prefix),
            (_, Some(_)) => {
                return Err(VersionError::specifier(
                    s,
                    "wildcards are only allowed with == and !=",
                ))
            },
            (operator, None) => (operator, operand),
        };

        let version: Version = operand
            .parse()
            .map_err(|e: VersionError| VersionError::specifier(s, e.to_string()))?;

        match operator {
            Operator::EqualStar | Operator::NotEqualStar
                if version.is_prerelease() || version.is_postrelease() || version.is_local() =>
            {
                return Err(VersionError::specifier(
                    s,
                    "wildcard prefix must be a release",
                ));
            },
            Operator::Compatible if version.release().len() < 2 => {
                return Err(VersionError::specifier(
                    s,
                    "~= requires at least two release segments",
                ));
            },
            Operator::Equal | Operator::NotEqual => {},
            _ if version.is_local() => {
                return Err(VersionError::specifier(
                    s,
                    "local versions are only allowed with == and !=",
                ));
            },
            _ => {},
        }

        Ok(Self::new(operator, version))
    }
}

impl fmt::Display for VersionSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            Operator::EqualStar | Operator::NotEqualStar => {
                write!(f, "{}{}.*", self.operator.as_str(), self.version)
            },
            Operator::ArbitraryEqual => write!(f, "==={}", self.literal),
            _ => write!(f, "{}{}", self.operator.as_str(), self.version),
        }
    }
}

impl VersionSpecifiers {
    /// The empty conjunction, satisfied by every version
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Check if `version` satisfies every clause
    pub fn contains(&self, version: &Version) -> bool {
        self.0.iter().all(|clause| clause.contains(version))
    }

    /// Check if any clause opts into pre-releases
    pub fn mentions_prerelease(&self) -> bool {
        self.0.iter().any(VersionSpecifier::mentions_prerelease)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VersionSpecifier> {
        self.0.iter()
    }
}

impl From<Vec<VersionSpecifier>> for VersionSpecifiers {
    fn from(clauses: Vec<VersionSpecifier>) -> Self {
        Self(clauses)
    }
}

impl FromStr for VersionSpecifiers {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::empty());
        }
        s.split(',')
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl fmt::Display for VersionSpecifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clauses: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&clauses.join(","))
    }
}

impl TryFrom<String> for VersionSpecifiers {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionSpecifiers> for String {
    fn from(specifiers: VersionSpecifiers) -> Self {
        specifiers.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    fn spec(s: &str) -> VersionSpecifiers {
        s.parse().unwrap()
    }

    #[test]
    fn test_empty_admits_everything() {
        let specifiers = spec("");
        assert!(specifiers.is_empty());
        assert!(specifiers.contains(&v("0.0.1")));
        assert!(specifiers.contains(&v("9.9rc1")));
    }

    #[test]
    fn test_range_conjunction() {
        let specifiers = spec(">=1.0, <2.0, !=1.5");
        assert!(specifiers.contains(&v("1.0")));
        assert!(specifiers.contains(&v("1.9.9")));
        assert!(!specifiers.contains(&v("1.5")));
        assert!(!specifiers.contains(&v("2.0")));
        assert!(!specifiers.contains(&v("0.9")));
    }

    #[test]
    fn test_exact_ignores_candidate_local_label() {
        assert!(spec("==1.0").contains(&v("1.0+abc")));
        assert!(spec("==1.0").contains(&v("1.0.0")));
        assert!(!spec("==1.0+abc").contains(&v("1.0")));
        assert!(spec("==1.0+abc").contains(&v("1.0+abc")));
        assert!(!spec("!=1.0").contains(&v("1.0+abc")));
    }

    #[test]
    fn test_prefix_match() {
        let specifiers = spec("==1.1.*");
        assert!(specifiers.contains(&v("1.1")));
        assert!(specifiers.contains(&v("1.1.5")));
        assert!(specifiers.contains(&v("1.1.post1")));
        assert!(specifiers.contains(&v("1.1a1")));
        assert!(!specifiers.contains(&v("1.2")));
        assert!(!specifiers.contains(&v("1!1.1")));

        assert!(spec("!=3.*").contains(&v("2.7")));
        assert!(!spec("!=3.*").contains(&v("3.11")));
    }

    #[test]
    fn test_compatible_release() {
        let specifiers = spec("~=2.2");
        assert!(specifiers.contains(&v("2.2")));
        assert!(specifiers.contains(&v("2.9")));
        assert!(!specifiers.contains(&v("3.0")));

        let specifiers = spec("~=1.4.5");
        assert!(specifiers.contains(&v("1.4.9")));
        assert!(!specifiers.contains(&v("1.5.0")));
        assert!(!specifiers.contains(&v("1.4.4")));

        assert!("~=1".parse::<VersionSpecifiers>().is_err());
    }

    #[test]
    fn test_exclusive_bounds() {
        assert!(!spec("<3.0").contains(&v("3.0rc1")));
        assert!(spec("<3.0rc2").contains(&v("3.0rc1")));
        assert!(spec("<3.0").contains(&v("2.9rc1")));

        assert!(!spec(">1.0").contains(&v("1.0.post1")));
        assert!(!spec(">1.0").contains(&v("1.0+local")));
        assert!(spec(">1.0.post1").contains(&v("1.0.post2")));
        assert!(spec(">1.0").contains(&v("1.1")));
    }

    #[test]
    fn test_inclusive_bounds_ignore_local() {
        assert!(spec("<=1.0").contains(&v("1.0+abc")));
        assert!(spec(">=1.0").contains(&v("1.0+abc")));
    }

    #[test]
    fn test_arbitrary_equality() {
        let specifiers = spec("===foobar");
        assert!(!specifiers.contains(&v("1.0")));
        assert!(spec("===1.0").contains(&v("1.0")));
        assert!(!spec("===1.0").contains(&v("1.0.0")));
    }

    #[test]
    fn test_mentions_prerelease() {
        assert!(spec(">=2.0b1").mentions_prerelease());
        assert!(spec("==1.0rc1").mentions_prerelease());
        assert!(!spec(">=2.0").mentions_prerelease());
        assert!(!spec("!=2.0b1").mentions_prerelease());
    }

    #[test]
    fn test_invalid_specifiers() {
        for input in ["1.0", ">=", ">=1.0.*", "==1.0a1.*", "<1.0+local", ">=abc"] {
            assert!(
                input.parse::<VersionSpecifiers>().is_err(),
                "{} should fail",
                input
            );
        }
    }

    #[test]
    fn test_display_normalizes() {
        assert_eq!(spec(" >= 1.0 ,< 2 ").to_string(), ">=1.0,<2");
        assert_eq!(spec("==1.0.*").to_string(), "==1.0.*");
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn not_equal_is_complement_of_equal(
            a in prop::collection::vec(0u64..5, 1..4),
            b in prop::collection::vec(0u64..5, 1..4),
        ) {
            let target = Version::new(a);
            let candidate = Version::new(b);
            let eq = VersionSpecifier::new(Operator::Equal, target.clone());
            let ne = VersionSpecifier::new(Operator::NotEqual, target);
            prop_assert_ne!(eq.contains(&candidate), ne.contains(&candidate));
        }
    }

    proptest! {
        #[test]
        fn display_then_parse_is_equivalent(
            major in 0u64..10,
            minor in 0u64..10,
            probe_major in 0u64..10,
            probe_minor in 0u64..10,
        ) {
            let text = format!(">={}.{},<{}", major, minor, major + 1);
            let parsed: VersionSpecifiers = text.parse().unwrap();
            let reparsed: VersionSpecifiers = parsed.to_string().parse().unwrap();
            let probe = Version::new(vec![probe_major, probe_minor]);
            prop_assert_eq!(parsed.contains(&probe), reparsed.contains(&probe));
        }
    }
}
