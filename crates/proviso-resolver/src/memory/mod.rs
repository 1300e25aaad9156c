//! In-memory package index
//!
//! A `PackageIndex` backed by a map, for tests, benchmarks and offline use.
//! Call counters record how often the resolver reached the index.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use proviso_core::{Name, PackageMetadata, ProvisoError, ProvisoResult, Requirement, Version, VersionSpecifiers};

use crate::supply::PackageIndex;

/// Map-backed package index
#[derive(Debug, Default)]
pub struct MemoryIndex {
    packages: BTreeMap<Name, BTreeMap<Version, PackageMetadata>>,
    /// Names whose lookups fail as if the index were down
    unavailable: BTreeSet<Name>,
    list_calls: AtomicUsize,
    metadata_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    /// Simulated round-trip time
    latency: Option<Duration>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `name==version` declaring the given PEP 508 dependencies
    pub fn with_package(self, name: &str, version: &str, dependencies: &[&str]) -> ProvisoResult<Self> {
        let name = Name::new(name)?;
        let version: Version = version.parse()?;
        let mut metadata = PackageMetadata::new(name, Some(version));
        for dependency in dependencies {
            metadata = metadata.with_requirement(dependency.parse::<Requirement>()?);
        }
        Ok(self.with_metadata(metadata))
    }

    /// Set `Requires-Python` on an already published release
    pub fn with_requires_python(mut self, name: &str, version: &str, specifiers: &str) -> ProvisoResult<Self> {
        let name = Name::new(name)?;
        let version: Version = version.parse()?;
        let specifiers: VersionSpecifiers = specifiers.parse()?;
        let metadata = self
            .packages
            .get_mut(&name)
            .and_then(|releases| releases.get_mut(&version))
            .ok_or_else(|| ProvisoError::PackageNotFound {
                name: format!("{}=={}", name, version),
            })?;
        metadata.requires_python = Some(specifiers);
        Ok(self)
    }

    /// Publish a release from complete metadata.
    ///
    /// Metadata without a version is ignored.
    pub fn with_metadata(mut self, metadata: PackageMetadata) -> Self {
        if let Some(version) = metadata.version.clone() {
            self.packages
                .entry(metadata.name.clone())
                .or_default()
                .insert(version, metadata);
        }
        self
    }

    /// Make every lookup of `name` fail with `SupplyUnavailable`
    pub fn with_unavailable(mut self, name: &str) -> ProvisoResult<Self> {
        self.unavailable.insert(Name::new(name)?);
        Ok(self)
    }

    /// Delay every lookup by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of `list_versions` calls served
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of `fetch_metadata` calls served
    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    /// Most lookups that were in progress at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn round_trip(&self, name: &Name) -> ProvisoResult<()> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.unavailable.contains(name) {
            return Err(ProvisoError::SupplyUnavailable {
                message: format!("{} is unavailable", name),
                source: None,
            });
        }
        Ok(())
    }
}

impl PackageIndex for MemoryIndex {
    async fn list_versions(&self, name: &Name) -> ProvisoResult<Vec<Version>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip(name).await?;
        self.packages
            .get(name)
            .map(|releases| releases.keys().cloned().collect())
            .ok_or_else(|| ProvisoError::PackageNotFound {
                name: name.to_string(),
            })
    }

    async fn fetch_metadata(&self, name: &Name, version: &Version) -> ProvisoResult<PackageMetadata> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip(name).await?;
        self.packages
            .get(name)
            .and_then(|releases| releases.get(version))
            .cloned()
            .ok_or_else(|| ProvisoError::PackageNotFound {
                name: format!("{}=={}", name, version),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_index_lookups() {
        let index = MemoryIndex::new()
            .with_package("demo", "1.0", &["click>=8"])
            .unwrap()
            .with_package("Demo", "2.0", &[])
            .unwrap()
            .with_requires_python("demo", "2.0", ">=3.9")
            .unwrap();

        let name = Name::new("demo").unwrap();
        let versions = index.list_versions(&name).await.unwrap();
        assert_eq!(versions.len(), 2);

        let metadata = index.fetch_metadata(&name, &"1.0".parse().unwrap()).await.unwrap();
        assert_eq!(metadata.requires_dist[0].to_string(), "click>=8");

        let newer = index.fetch_metadata(&name, &"2.0".parse().unwrap()).await.unwrap();
        assert_eq!(newer.requires_python.unwrap().to_string(), ">=3.9");

        assert_eq!(index.list_calls(), 1);
        assert_eq!(index.metadata_calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_and_unavailable() {
        let index = MemoryIndex::new().with_unavailable("down").unwrap();

        let missing = index.list_versions(&Name::new("nope").unwrap()).await.unwrap_err();
        assert!(missing.is_not_found());

        let down = index.list_versions(&Name::new("down").unwrap()).await.unwrap_err();
        assert!(matches!(down, ProvisoError::SupplyUnavailable { .. }));
    }

    #[test]
    fn test_requires_python_on_unknown_release() {
        let result = MemoryIndex::new().with_requires_python("demo", "1.0", ">=3.8");
        assert!(result.is_err());
    }
}
