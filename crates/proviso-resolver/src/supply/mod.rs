//! Candidate supply
//!
//! `PackageIndex` is the seam to the remote index. `CandidateSupply` wraps an
//! index with process-wide memo tables so that every version list and every
//! release's metadata is fetched at most once, however many environments
//! share the supply.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OnceCell, Semaphore};
use tokio::task::JoinSet;

use proviso_core::{
    Candidate, Environment, Name, PackageMetadata, ProvisoError, ProvisoResult, Requirement, Version,
    VersionSpecifiers,
};
use proviso_index::IndexClient;

/// Remote capability the resolver queries
pub trait PackageIndex: Send + Sync {
    /// All versions published for `name`, in any order
    fn list_versions(&self, name: &Name) -> impl Future<Output = ProvisoResult<Vec<Version>>> + Send;

    /// Declared metadata of one release
    fn fetch_metadata(
        &self,
        name: &Name,
        version: &Version,
    ) -> impl Future<Output = ProvisoResult<PackageMetadata>> + Send;
}

impl PackageIndex for IndexClient {
    async fn list_versions(&self, name: &Name) -> ProvisoResult<Vec<Version>> {
        IndexClient::list_versions(self, name).await
    }

    async fn fetch_metadata(&self, name: &Name, version: &Version) -> ProvisoResult<PackageMetadata> {
        IndexClient::fetch_metadata(self, name, version).await
    }
}

/// Memoized outcome of a version listing
#[derive(Debug)]
enum Listing {
    Found(Arc<Vec<Version>>),
    NotFound,
}

type Memo<K, V> = DashMap<K, Arc<OnceCell<V>>>;

/// Memoizing supply of candidates and dependency edges
#[derive(Debug)]
pub struct CandidateSupply<I> {
    index: I,
    /// Version lists by name
    versions: Memo<Name, Listing>,
    /// Raw metadata by release
    metadata: Memo<(Name, Version), Arc<PackageMetadata>>,
    /// Edges a candidate's extras can activate, before environment filtering
    edges: Memo<Candidate, Arc<Vec<Requirement>>>,
    list_requests: AtomicUsize,
    metadata_requests: AtomicUsize,
}

/// Version listings fetched at once by `prefetch_versions`
pub const PREFETCH_CONCURRENCY: usize = 16;

/// Memo table sizes and index round-trip counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupplyStats {
    pub cached_version_lists: usize,
    pub cached_metadata: usize,
    pub cached_edge_sets: usize,
    pub list_requests: usize,
    pub metadata_requests: usize,
}

/// Get or create the cell for `key` without holding the shard lock afterwards
fn cell_for<K, V>(memo: &Memo<K, V>, key: &K) -> Arc<OnceCell<V>>
where
    K: Eq + std::hash::Hash + Clone,
{
    if let Some(cell) = memo.get(key) {
        return Arc::clone(&cell);
    }
    Arc::clone(&memo.entry(key.clone()).or_default())
}

impl<I: PackageIndex> CandidateSupply<I> {
    pub fn new(index: I) -> Self {
        Self {
            index,
            versions: DashMap::new(),
            metadata: DashMap::new(),
            edges: DashMap::new(),
            list_requests: AtomicUsize::new(0),
            metadata_requests: AtomicUsize::new(0),
        }
    }

    /// The wrapped index
    pub fn index(&self) -> &I {
        &self.index
    }

    /// Check if the version list of `name` is already memoized
    pub fn is_listed(&self, name: &Name) -> bool {
        self.versions.get(name).is_some_and(|cell| cell.initialized())
    }

    /// All versions of `name`, ascending. Memoized per name.
    ///
    /// A project unknown to the index yields `PackageNotFound`, which is
    /// memoized too.
    pub async fn list_versions(&self, name: &Name) -> ProvisoResult<Arc<Vec<Version>>> {
        let cell = cell_for(&self.versions, name);
        let listing = cell
            .get_or_try_init(|| async {
                self.list_requests.fetch_add(1, Ordering::Relaxed);
                match self.index.list_versions(name).await {
                    Ok(mut versions) => {
                        versions.sort();
                        versions.dedup();
                        Ok(Listing::Found(Arc::new(versions)))
                    },
                    Err(error) if error.is_not_found() => {
                        tracing::debug!("{}: not found on the index", name);
                        Ok(Listing::NotFound)
                    },
                    Err(error) => Err(error),
                }
            })
            .await?;

        match listing {
            Listing::Found(versions) => Ok(Arc::clone(versions)),
            Listing::NotFound => Err(ProvisoError::PackageNotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Raw metadata of a release. Memoized per (name, version).
    ///
    /// A release the index does not know is treated as declaring nothing.
    pub async fn metadata(&self, name: &Name, version: &Version) -> ProvisoResult<Arc<PackageMetadata>> {
        let key = (name.clone(), version.clone());
        let cell = cell_for(&self.metadata, &key);
        cell.get_or_try_init(|| async {
            self.metadata_requests.fetch_add(1, Ordering::Relaxed);
            match self.index.fetch_metadata(name, version).await {
                Ok(metadata) => Ok(Arc::new(metadata)),
                Err(error) if error.is_not_found() => {
                    tracing::warn!("{}=={}: no metadata found, assuming no dependencies", name, version);
                    Ok(Arc::new(PackageMetadata::new(name.clone(), Some(version.clone()))))
                },
                Err(error) => Err(error),
            }
        })
        .await
        .map(Arc::clone)
    }

    /// Declared edges the candidate's extras can activate, in any environment
    async fn candidate_edges(&self, candidate: &Candidate) -> ProvisoResult<Arc<Vec<Requirement>>> {
        let cell = cell_for(&self.edges, candidate);
        cell.get_or_try_init(|| async {
            let metadata = self.metadata(&candidate.name, &candidate.version).await?;
            let edges: Vec<Requirement> = metadata
                .requires_dist
                .iter()
                .filter(|requirement| match &requirement.marker {
                    None => true,
                    Some(marker) if !marker.references_extra() => true,
                    Some(marker) => std::iter::once("")
                        .chain(candidate.extras.iter().map(String::as_str))
                        .any(|extra| marker.holds_for_extra(extra)),
                })
                .cloned()
                .collect();
            Ok::<_, ProvisoError>(Arc::new(edges))
        })
        .await
        .map(Arc::clone)
    }

    /// Dependency edges of `candidate` that apply in `env`.
    ///
    /// An edge applies when it has no marker, or its marker holds with
    /// `extra` set to "" or to one of the candidate's extras.
    pub async fn dependency_edges(&self, candidate: &Candidate, env: &Environment) -> ProvisoResult<Vec<Requirement>> {
        let edges = self.candidate_edges(candidate).await?;
        Ok(edges
            .iter()
            .filter(|requirement| match &requirement.marker {
                None => true,
                Some(marker) => std::iter::once("")
                    .chain(candidate.extras.iter().map(String::as_str))
                    .any(|extra| marker.evaluate_with_extra(env, extra)),
            })
            .cloned()
            .collect())
    }

    /// The candidate's declared `Requires-Python`
    pub async fn requires_python(&self, candidate: &Candidate) -> ProvisoResult<Option<VersionSpecifiers>> {
        let metadata = self.metadata(&candidate.name, &candidate.version).await?;
        Ok(metadata.requires_python.clone())
    }

    /// Check if the candidate supports the environment's interpreter
    pub async fn is_compatible(&self, candidate: &Candidate, env: &Environment) -> ProvisoResult<bool> {
        let metadata = self.metadata(&candidate.name, &candidate.version).await?;
        Ok(metadata.is_python_compatible(env))
    }

    pub fn stats(&self) -> SupplyStats {
        SupplyStats {
            cached_version_lists: self.versions.iter().filter(|entry| entry.value().initialized()).count(),
            cached_metadata: self.metadata.iter().filter(|entry| entry.value().initialized()).count(),
            cached_edge_sets: self.edges.iter().filter(|entry| entry.value().initialized()).count(),
            list_requests: self.list_requests.load(Ordering::Relaxed),
            metadata_requests: self.metadata_requests.load(Ordering::Relaxed),
        }
    }
}

impl<I: PackageIndex + 'static> CandidateSupply<I> {
    /// List every name not yet memoized, `PREFETCH_CONCURRENCY` at a time.
    ///
    /// Errors stay unmemoized; the next `list_versions` call reports them.
    pub async fn prefetch_versions(self: &Arc<Self>, names: impl IntoIterator<Item = Name>) {
        let pending: Vec<Name> = names.into_iter().filter(|name| !self.is_listed(name)).collect();
        if pending.len() < 2 {
            return;
        }

        tracing::debug!("prefetching {} version lists", pending.len());
        let semaphore = Arc::new(Semaphore::new(PREFETCH_CONCURRENCY));
        let mut join_set = JoinSet::new();
        for name in pending {
            let supply = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                if let Err(error) = supply.list_versions(&name).await {
                    tracing::trace!("prefetch of {} failed: {}", name, error);
                }
            });
        }

        while let Some(joined) = join_set.join_next().await {
            if let Err(error) = joined {
                if error.is_panic() {
                    std::panic::resume_unwind(error.into_panic());
                }
            }
        }
    }
}
