//! Multi-environment orchestration
//!
//! Runs one resolution per target environment over a shared candidate
//! supply, a bounded number at a time, and merges the assignments into a
//! single `name -> version -> environments` map. A failing environment is
//! reported without aborting its siblings.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexSet;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use proviso_core::{Environment, Name, Requirement, Version};

use crate::engine::{Resolution, Resolver, DEFAULT_MAX_ROUNDS};
use crate::error::ResolutionError;
use crate::supply::{CandidateSupply, PackageIndex};

/// Default number of environments resolved at once
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Orchestration settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorOptions {
    /// Round bound for each environment's search
    pub max_rounds: usize,
    /// Wall-clock budget per environment
    pub timeout: Option<Duration>,
    /// Environments resolved concurrently
    pub concurrency: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            timeout: None,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// An environment that could not be resolved
#[derive(Debug)]
pub struct EnvironmentFailure {
    pub label: String,
    pub error: ResolutionError,
}

/// Merged outcome across all environments
#[derive(Debug, Default)]
pub struct MultiResolution {
    /// Requested environment labels, in request order
    pub environments: Vec<String>,
    /// Marker variable each label is expressed in, parallel to `environments`
    pub label_variables: Vec<String>,
    /// Chosen versions with the environments that chose them
    pub versions: BTreeMap<Name, BTreeMap<Version, IndexSet<String>>>,
    /// Environments that failed, in request order
    pub failures: Vec<EnvironmentFailure>,
}

impl MultiResolution {
    fn empty(environments: &[Environment]) -> Self {
        Self {
            environments: environments.iter().map(|env| env.label().to_string()).collect(),
            label_variables: environments
                .iter()
                .map(|env| env.label_variable().to_string())
                .collect(),
            versions: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    fn merge(&mut self, label: &str, resolution: Resolution) {
        for (name, candidate) in resolution.mapping {
            self.versions
                .entry(name)
                .or_default()
                .entry(candidate.version)
                .or_default()
                .insert(label.to_string());
        }
    }

    /// Merge per-environment outcomes given in request order.
    ///
    /// A slot left empty by a task that never finished counts as a failure,
    /// so its label never ends up implied by the markers.
    fn record(&mut self, outcomes: Vec<Option<Result<Resolution, ResolutionError>>>) {
        let labels = self.environments.clone();
        for (label, outcome) in labels.into_iter().zip(outcomes) {
            match outcome.unwrap_or(Err(ResolutionError::Cancelled)) {
                Ok(resolution) => {
                    tracing::info!(
                        "Resolved {} packages for {} in {} rounds",
                        resolution.mapping.len(),
                        label,
                        resolution.rounds
                    );
                    self.merge(&label, resolution);
                },
                Err(error) => {
                    tracing::warn!("Resolution failed for {}: {}", label, error.kind());
                    self.failures.push(EnvironmentFailure { label, error });
                },
            }
        }
    }

    /// Marker variable for one requested label
    pub fn label_variable(&self, label: &str) -> &str {
        self.environments
            .iter()
            .position(|candidate| candidate == label)
            .and_then(|index| self.label_variables.get(index))
            .map_or("python_version", String::as_str)
    }

    /// Check if every environment resolved
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Check if `labels` names every requested environment
    pub fn covers_all(&self, labels: &IndexSet<String>) -> bool {
        self.environments.iter().all(|label| labels.contains(label))
    }

    /// Number of distinct (name, version) pairs
    pub fn pinned_count(&self) -> usize {
        self.versions.values().map(BTreeMap::len).sum()
    }

    /// Packages resolved for one environment
    pub fn count_for(&self, label: &str) -> usize {
        self.versions
            .values()
            .flat_map(BTreeMap::values)
            .filter(|labels| labels.contains(label))
            .count()
    }
}

/// Runs the engine once per environment
#[derive(Debug)]
pub struct Orchestrator<I> {
    supply: Arc<CandidateSupply<I>>,
    options: OrchestratorOptions,
}

impl<I: PackageIndex + 'static> Orchestrator<I> {
    pub fn new(supply: Arc<CandidateSupply<I>>) -> Self {
        Self {
            supply,
            options: OrchestratorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn supply(&self) -> &Arc<CandidateSupply<I>> {
        &self.supply
    }

    /// Resolve `requirements` in every environment and merge the results
    pub async fn resolve_all(&self, requirements: &[Requirement], environments: &[Environment]) -> MultiResolution {
        let mut merged = MultiResolution::empty(environments);
        if requirements.is_empty() {
            tracing::info!("No requirements to resolve");
            return merged;
        }

        let requirements = Arc::new(requirements.to_vec());
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut join_set = JoinSet::new();

        for (position, env) in environments.iter().enumerate() {
            let supply = Arc::clone(&self.supply);
            let requirements = Arc::clone(&requirements);
            let semaphore = Arc::clone(&semaphore);
            let env = env.clone();
            let options = self.options.clone();

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                tracing::info!("Resolving for {}", env);
                let resolver = Resolver::new(supply).with_max_rounds(options.max_rounds);
                let result = match options.timeout {
                    Some(limit) => tokio::time::timeout(limit, resolver.resolve(&requirements, &env))
                        .await
                        .unwrap_or(Err(ResolutionError::TimedOut { elapsed: limit })),
                    None => resolver.resolve(&requirements, &env).await,
                };
                (position, result)
            });
        }

        let mut outcomes: Vec<Option<Result<Resolution, ResolutionError>>> =
            environments.iter().map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((position, result)) => outcomes[position] = Some(result),
                Err(error) if error.is_panic() => std::panic::resume_unwind(error.into_panic()),
                Err(error) => tracing::error!("Resolution task failed: {}", error),
            }
        }

        merged.record(outcomes);
        merged
    }
}
