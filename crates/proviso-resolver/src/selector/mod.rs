//! Candidate version selection
//!
//! Filters a name's published versions against the active constraints and
//! the versions already ruled out, applying the pre-release policy: final
//! releases only, unless pre-releases were asked for or no final release
//! satisfies the constraints at all.

use std::collections::BTreeSet;

use proviso_core::{Version, VersionSpecifiers};

/// Version selector over the published versions of one name
#[derive(Debug, Clone)]
pub struct VersionSelector<'a> {
    /// Available versions, ascending
    available: &'a [Version],
}

impl<'a> VersionSelector<'a> {
    /// Create a selector over versions sorted ascending
    pub fn new(available: &'a [Version]) -> Self {
        Self { available }
    }

    fn matching<'c>(
        &'c self,
        constraints: &'c [&'c VersionSpecifiers],
    ) -> impl DoubleEndedIterator<Item = &'a Version> + 'c {
        self.available
            .iter()
            .filter(move |version| constraints.iter().all(|constraint| constraint.contains(version)))
    }

    /// Check if a final release satisfies every constraint
    pub fn has_stable_match(&self, constraints: &[&VersionSpecifiers]) -> bool {
        self.matching(constraints).any(|version| !version.is_prerelease())
    }

    /// Versions satisfying every constraint and not excluded, newest first.
    ///
    /// Pre-releases are kept when `allow_prerelease` is set, or when no final
    /// release satisfies the constraints (before exclusions are applied).
    pub fn select(
        &self,
        constraints: &[&VersionSpecifiers],
        excluded: &BTreeSet<Version>,
        allow_prerelease: bool,
    ) -> Vec<Version> {
        let stable_only = !allow_prerelease && self.has_stable_match(constraints);
        self.matching(constraints)
            .rev()
            .filter(|version| !(stable_only && version.is_prerelease()))
            .filter(|version| !excluded.contains(*version))
            .cloned()
            .collect()
    }

    /// Highest version satisfying every constraint under the same policy
    pub fn select_best(&self, constraints: &[&VersionSpecifiers], allow_prerelease: bool) -> Option<Version> {
        self.select(constraints, &BTreeSet::new(), allow_prerelease)
            .into_iter()
            .next()
    }
}
