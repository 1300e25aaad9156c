//! Search state: pins and the criteria map

use std::collections::{BTreeMap, BTreeSet};

use proviso_core::{Candidate, Name, Version, VersionSpecifiers};

use crate::error::RequirementInformation;

/// What constrains one name in the current branch
#[derive(Debug, Clone, Default)]
pub(crate) struct Criterion {
    /// Active requirements with the candidate that introduced each
    pub information: Vec<RequirementInformation>,
    /// Versions ruled out in this branch
    pub incompatibilities: BTreeSet<Version>,
}

impl Criterion {
    pub fn constraints(&self) -> Vec<&VersionSpecifiers> {
        self.information
            .iter()
            .map(|info| &info.requirement.specifier)
            .collect()
    }

    /// Union of the extras every active requirement asks for
    pub fn requested_extras(&self) -> BTreeSet<String> {
        self.information
            .iter()
            .flat_map(|info| info.requirement.extras.iter().cloned())
            .collect()
    }

    /// Check if any active requirement opts into pre-releases
    pub fn allows_prerelease(&self) -> bool {
        self.information
            .iter()
            .any(|info| info.requirement.mentions_prerelease())
    }
}

/// Pins plus criteria, snapshotted before every decision
#[derive(Debug, Clone, Default)]
pub(crate) struct State {
    pub pins: BTreeMap<Name, Candidate>,
    pub criteria: BTreeMap<Name, Criterion>,
}

impl State {
    /// Names with an active requirement and no pin, in canonical order
    pub fn unpinned(&self) -> impl Iterator<Item = &Name> {
        self.criteria.keys().filter(move |name| !self.pins.contains_key(*name))
    }

    /// Record a requirement on its target name.
    ///
    /// Returns false when the same requirement from the same release is
    /// already active.
    pub fn add(&mut self, info: RequirementInformation) -> bool {
        let criterion = self.criteria.entry(info.requirement.name.clone()).or_default();
        if criterion.information.iter().any(|existing| existing.same_origin(&info)) {
            return false;
        }
        criterion.information.push(info);
        true
    }

    /// Rule out `version` of `name` for the rest of this branch
    pub fn exclude(&mut self, name: &Name, version: &Version) {
        self.criteria
            .entry(name.clone())
            .or_default()
            .incompatibilities
            .insert(version.clone());
    }

    /// Active requirements on `name`
    pub fn information(&self, name: &Name) -> Vec<RequirementInformation> {
        self.criteria
            .get(name)
            .map(|criterion| criterion.information.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(req: &str) -> RequirementInformation {
        RequirementInformation::root(req.parse().unwrap())
    }

    #[test]
    fn test_add_dedupes_same_origin() {
        let mut state = State::default();
        assert!(state.add(info("a>=1")));
        assert!(!state.add(info("a>=1")));
        assert!(state.add(info("a<3")));

        let name = Name::new("a").unwrap();
        assert_eq!(state.information(&name).len(), 2);
        assert_eq!(state.criteria[&name].constraints().len(), 2);
    }

    #[test]
    fn test_unpinned_and_extras() {
        let mut state = State::default();
        state.add(info("b[x]"));
        state.add(info("b[y]>=1.0a1"));
        state.add(info("a"));
        let a = Name::new("a").unwrap();
        state
            .pins
            .insert(a.clone(), Candidate::new(a.clone(), "1.0".parse().unwrap()));

        let unpinned: Vec<String> = state.unpinned().map(ToString::to_string).collect();
        assert_eq!(unpinned, vec!["b"]);

        let b = &state.criteria[&Name::new("b").unwrap()];
        assert_eq!(b.requested_extras().into_iter().collect::<Vec<_>>(), vec!["x", "y"]);
        assert!(b.allows_prerelease());
    }
}
