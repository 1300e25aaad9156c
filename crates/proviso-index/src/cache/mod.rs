//! Project page cache
//!
//! Simple-index pages are kept per canonical name until their deadline
//! passes. Stale pages are dropped lazily on lookup or in bulk by
//! `evict_stale`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use proviso_core::Name;

use crate::api::ProjectPage;

/// Default time-to-live for cached project pages
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// A cached page and the instant it goes stale
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub page: Arc<ProjectPage>,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn new(page: Arc<ProjectPage>, ttl: Duration) -> Self {
        Self {
            page,
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Project pages shared by every request of one `IndexClient`
#[derive(Debug)]
pub struct ProjectCache {
    pages: DashMap<Name, CacheEntry>,
    ttl: Duration,
}

impl ProjectCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self { pages: DashMap::new(), ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached page for `name`, unless it has gone stale
    pub fn get(&self, name: &Name) -> Option<Arc<ProjectPage>> {
        // Copy the entry out so no shard lock is held during removal
        let entry = self.pages.get(name).map(|entry| entry.value().clone())?;
        if entry.is_fresh() {
            return Some(entry.page);
        }
        self.pages.remove_if(name, |_, entry| !entry.is_fresh());
        None
    }

    pub fn insert(&self, name: Name, page: Arc<ProjectPage>) {
        self.insert_with_ttl(name, page, self.ttl);
    }

    pub fn insert_with_ttl(&self, name: Name, page: Arc<ProjectPage>, ttl: Duration) {
        self.pages.insert(name, CacheEntry::new(page, ttl));
    }

    pub fn contains_fresh(&self, name: &Name) -> bool {
        self.pages.get(name).is_some_and(|entry| entry.is_fresh())
    }

    pub fn stats(&self) -> CacheStats {
        let fresh_entries = self.pages.iter().filter(|entry| entry.is_fresh()).count();
        CacheStats {
            total_entries: self.pages.len(),
            fresh_entries,
            stale_entries: self.pages.len() - fresh_entries,
        }
    }

    /// Drop every stale page, returning how many were removed
    pub fn evict_stale(&self) -> usize {
        let before = self.pages.len();
        self.pages.retain(|_, entry| entry.is_fresh());
        before - self.pages.len()
    }
}

impl Default for ProjectCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache occupancy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub fresh_entries: usize,
    pub stale_entries: usize,
}
