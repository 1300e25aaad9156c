//! Backtracking resolution engine
//!
//! Resolves requirements for a single environment. Each round picks an
//! unpinned name, tries its candidates newest first and pins the first one
//! whose dependency edges are consistent with the current pins. When a name
//! runs out of candidates the most recent decision is undone and its next
//! candidate tried.
//!
//! Preference when picking a name: names re-decided after a backtrack come
//! first, then names with the fewest remaining candidates, then canonical
//! name order.

mod state;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use tracing::Instrument;

use proviso_core::{Candidate, Environment, Name, ProvisoError, Requirement};

use crate::error::{RequirementInformation, ResolutionError};
use crate::selector::VersionSelector;
use crate::supply::{CandidateSupply, PackageIndex};

use state::{Criterion, State};

/// Default bound on search rounds
pub const DEFAULT_MAX_ROUNDS: usize = 200_000;

/// Single-environment resolver over a shared candidate supply
#[derive(Debug)]
pub struct Resolver<I> {
    supply: Arc<CandidateSupply<I>>,
    max_rounds: usize,
}

/// A complete, consistent assignment for one environment
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Chosen candidate per name
    pub mapping: BTreeMap<Name, Candidate>,
    /// Requirements active on each name, with the candidate that introduced each
    pub criteria: BTreeMap<Name, Vec<RequirementInformation>>,
    /// Rounds spent, backtracking steps included
    pub rounds: usize,
}

impl Resolution {
    /// Check that every active requirement holds for the chosen candidate
    pub fn is_consistent(&self) -> bool {
        self.criteria.iter().all(|(name, information)| match self.mapping.get(name) {
            Some(candidate) => information
                .iter()
                .all(|info| info.requirement.is_satisfied_by(candidate)),
            None => false,
        })
    }
}

impl<I: PackageIndex + 'static> Resolver<I> {
    pub fn new(supply: Arc<CandidateSupply<I>>) -> Self {
        Self {
            supply,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    /// Bound the number of search rounds
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn supply(&self) -> &Arc<CandidateSupply<I>> {
        &self.supply
    }

    /// Resolve `requirements` in `env`.
    ///
    /// Top-level requirements whose markers exclude `env` are dropped;
    /// clauses on `extra` are treated as satisfied.
    pub async fn resolve(&self, requirements: &[Requirement], env: &Environment) -> Result<Resolution, ResolutionError> {
        let span = tracing::debug_span!("resolve", env = %env.label());
        let mut search = Search::new(&self.supply, env, self.max_rounds);
        for requirement in requirements.iter().filter(|requirement| requirement.applies_to(env)) {
            search.state.add(RequirementInformation::root(requirement.clone()));
        }
        search.run().instrument(span).await
    }
}

/// One decision on the stack
#[derive(Debug)]
struct Frame {
    name: Name,
    candidate: Candidate,
    /// State before the decision was made
    snapshot: State,
    /// Candidates not yet tried for `name`
    remaining: VecDeque<Candidate>,
}

/// Outcome of trying one candidate
enum Attempt {
    Pinned(State),
    /// `Requires-Python` excludes the environment
    Rejected,
    /// A new edge contradicts an existing pin
    Conflict(RequirementInformation),
}

/// Mutable search over one environment
struct Search<'r, I> {
    supply: &'r Arc<CandidateSupply<I>>,
    env: &'r Environment,
    state: State,
    stack: Vec<Frame>,
    backtracked: BTreeSet<Name>,
    rounds: usize,
    max_rounds: usize,
    last_conflict: Option<RequirementInformation>,
}

fn unavailable(error: ProvisoError) -> ResolutionError {
    ResolutionError::unavailable(error)
}

impl<'r, I: PackageIndex + 'static> Search<'r, I> {
    fn new(supply: &'r Arc<CandidateSupply<I>>, env: &'r Environment, max_rounds: usize) -> Self {
        Self {
            supply,
            env,
            state: State::default(),
            stack: Vec::new(),
            backtracked: BTreeSet::new(),
            rounds: 0,
            max_rounds,
            last_conflict: None,
        }
    }

    async fn run(mut self) -> Result<Resolution, ResolutionError> {
        loop {
            self.tick()?;

            let Some((name, mut candidates)) = self.select().await? else {
                tracing::debug!("resolved {} packages in {} rounds", self.state.pins.len(), self.rounds);
                return Ok(self.finish());
            };

            tracing::trace!("deciding {} with {} candidates", name, candidates.len());
            if !self.try_candidates(&name, &mut candidates).await? {
                tracing::debug!("no candidate left for {}", name);
                let causes = self.state.information(&name);
                self.backtrack(name, causes).await?;
            }
        }
    }

    fn tick(&mut self) -> Result<(), ResolutionError> {
        self.rounds += 1;
        if self.rounds > self.max_rounds {
            return Err(ResolutionError::TooComplex {
                rounds: self.max_rounds,
            });
        }
        Ok(())
    }

    /// Pick the next unpinned name together with its candidates
    async fn select(&self) -> Result<Option<(Name, VecDeque<Candidate>)>, ResolutionError> {
        let unpinned: Vec<Name> = self.state.unpinned().cloned().collect();
        self.supply.prefetch_versions(unpinned.iter().cloned()).await;

        let mut best: Option<((bool, usize), Name, VecDeque<Candidate>)> = None;

        for name in unpinned {
            let candidates = self.candidates(&name).await?;
            let key = (!self.backtracked.contains(&name), candidates.len());
            if best.as_ref().map_or(true, |(best_key, ..)| key < *best_key) {
                best = Some((key, name, candidates));
            }
        }

        Ok(best.map(|(_, name, candidates)| (name, candidates)))
    }

    /// Viable candidates for `name` in the current state, newest first
    async fn candidates(&self, name: &Name) -> Result<VecDeque<Candidate>, ResolutionError> {
        let versions = match self.supply.list_versions(name).await {
            Ok(versions) => versions,
            Err(error) if error.is_not_found() => Arc::new(Vec::new()),
            Err(error) => return Err(unavailable(error)),
        };

        let unconstrained = Criterion::default();
        let criterion = self.state.criteria.get(name).unwrap_or(&unconstrained);
        let extras = criterion.requested_extras();
        let selected = VersionSelector::new(&versions).select(
            &criterion.constraints(),
            &criterion.incompatibilities,
            criterion.allows_prerelease(),
        );

        Ok(selected
            .into_iter()
            .map(|version| Candidate::new(name.clone(), version).with_extras(extras.iter().cloned()))
            .collect())
    }

    /// Try candidates in order until one pins; push its frame on success
    async fn try_candidates(&mut self, name: &Name, remaining: &mut VecDeque<Candidate>) -> Result<bool, ResolutionError> {
        while let Some(candidate) = remaining.pop_front() {
            match self.attempt(name, &candidate).await? {
                Attempt::Pinned(next) => {
                    tracing::debug!("pinned {}", candidate);
                    let snapshot = std::mem::replace(&mut self.state, next);
                    self.stack.push(Frame {
                        name: name.clone(),
                        candidate,
                        snapshot,
                        remaining: std::mem::take(remaining),
                    });
                    return Ok(true);
                },
                Attempt::Rejected => {
                    tracing::trace!("{} does not support Python {}", candidate, self.env.label());
                    self.state.exclude(name, &candidate.version);
                },
                Attempt::Conflict(info) => {
                    tracing::debug!("{} conflicts with {}", candidate, info);
                    self.state.exclude(name, &candidate.version);
                    self.last_conflict = Some(info);
                },
            }
        }
        Ok(false)
    }

    /// Pin `candidate` on a copy of the state and add its edges
    async fn attempt(&self, name: &Name, candidate: &Candidate) -> Result<Attempt, ResolutionError> {
        if !self.supply.is_compatible(candidate, self.env).await.map_err(unavailable)? {
            return Ok(Attempt::Rejected);
        }

        let mut state = self.state.clone();
        state.pins.insert(name.clone(), candidate.clone());

        let mut pending: VecDeque<RequirementInformation> = self
            .supply
            .dependency_edges(candidate, self.env)
            .await
            .map_err(unavailable)?
            .into_iter()
            .map(|edge| RequirementInformation::from_parent(edge, candidate.clone()))
            .collect();

        while let Some(info) = pending.pop_front() {
            let target = info.requirement.name.clone();
            if !state.add(info.clone()) {
                continue;
            }
            let Some(pin) = state.pins.get(&target).cloned() else {
                continue;
            };
            if !info.requirement.specifier.contains(&pin.version) {
                return Ok(Attempt::Conflict(info));
            }
            if !info.requirement.extras.is_subset(&pin.extras) {
                let widened = pin.with_extras(info.requirement.extras.iter().cloned());
                tracing::trace!("widening pin to {}", widened);
                let edges = self
                    .supply
                    .dependency_edges(&widened, self.env)
                    .await
                    .map_err(unavailable)?;
                pending.extend(
                    edges
                        .into_iter()
                        .map(|edge| RequirementInformation::from_parent(edge, widened.clone())),
                );
                state.pins.insert(target, widened);
            }
        }

        Ok(Attempt::Pinned(state))
    }

    /// Undo decisions until one has an untried candidate that pins
    async fn backtrack(&mut self, failed: Name, causes: Vec<RequirementInformation>) -> Result<(), ResolutionError> {
        loop {
            let Some(frame) = self.stack.pop() else {
                return Err(ResolutionError::Exhausted {
                    name: failed,
                    causes,
                    conflict: self.last_conflict.take(),
                });
            };
            self.tick()?;

            tracing::debug!("backtracking {}", frame.candidate);
            let Frame {
                name,
                candidate,
                snapshot,
                mut remaining,
            } = frame;
            self.state = snapshot;
            self.state.exclude(&name, &candidate.version);
            self.backtracked.insert(name.clone());

            if self.try_candidates(&name, &mut remaining).await? {
                return Ok(());
            }
        }
    }

    fn finish(self) -> Resolution {
        let criteria = self
            .state
            .criteria
            .into_iter()
            .map(|(name, criterion)| (name, criterion.information))
            .collect();
        Resolution {
            mapping: self.state.pins,
            criteria,
            rounds: self.rounds,
        }
    }
}

#[cfg(test)]
mod tests;
