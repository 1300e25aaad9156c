//! HTTP client implementation with connection pooling and retry logic

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, ClientBuilder, StatusCode};
use url::Url;

use proviso_core::{Name, PackageMetadata, ProvisoError, Version};

use crate::api::{parse_core_metadata, DistFilename, DistKind, ProjectFile, ProjectPage, SIMPLE_JSON_MEDIA_TYPE};
use crate::cache::{ProjectCache, DEFAULT_TTL};
use crate::IndexResult;

/// The public Python package index
pub const DEFAULT_INDEX_URL: &str = "https://pypi.org/simple/";

/// Configuration for exponential backoff retry logic
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// Index client configuration
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Simple index base URLs, queried in order
    pub index_urls: Vec<Url>,
    /// Retry policy for every request
    pub retry: RetryConfig,
    /// Ignore files uploaded after this instant
    pub exclude_newer: Option<DateTime<Utc>>,
    /// How long project pages stay cached
    pub cache_ttl: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_urls: Url::parse(DEFAULT_INDEX_URL).into_iter().collect(),
            retry: RetryConfig::default(),
            exclude_newer: None,
            cache_ttl: DEFAULT_TTL,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl IndexConfig {
    /// Use these index URLs instead of the default
    pub fn with_index_urls<I, S>(mut self, urls: I) -> IndexResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.index_urls = urls
            .into_iter()
            .map(|url| parse_index_url(url.as_ref()))
            .collect::<IndexResult<_>>()?;
        if self.index_urls.is_empty() {
            return Err(ProvisoError::config("index-urls", "at least one index URL is required"));
        }
        Ok(self)
    }

    /// Ignore files uploaded after `cutoff`
    pub fn with_exclude_newer(mut self, cutoff: Option<DateTime<Utc>>) -> Self {
        self.exclude_newer = cutoff;
        self
    }
}

/// Parse an index base URL, making sure it ends with `/` so that joining a
/// project name appends rather than replaces the last segment
pub fn parse_index_url(text: &str) -> IndexResult<Url> {
    let text = text.trim();
    let with_slash = if text.ends_with('/') {
        text.to_string()
    } else {
        format!("{}/", text)
    };
    Url::parse(&with_slash)
        .map_err(|e| ProvisoError::config("index-urls", format!("invalid URL '{}': {}", text, e)))
}

/// Client for PEP 691 simple package indexes
#[derive(Debug, Clone)]
pub struct IndexClient {
    /// Underlying HTTP client with connection pooling
    client: Client,
    /// Retry configuration
    retry_config: RetryConfig,
    /// Index base URLs
    index_urls: Vec<Url>,
    /// Upload-time cutoff
    exclude_newer: Option<DateTime<Utc>>,
    /// Project page cache shared by clones
    cache: Arc<ProjectCache>,
}

impl IndexClient {
    /// Create a client for the public index
    pub fn new() -> IndexResult<Self> {
        Self::with_config(IndexConfig::default())
    }

    /// Create a client with custom configuration
    pub fn with_config(config: IndexConfig) -> IndexResult<Self> {
        let client = build_http_client(config.request_timeout)?;

        Ok(Self {
            client,
            retry_config: config.retry,
            index_urls: config.index_urls,
            exclude_newer: config.exclude_newer,
            cache: Arc::new(ProjectCache::with_ttl(config.cache_ttl)),
        })
    }

    /// Configured index base URLs
    pub fn index_urls(&self) -> &[Url] {
        &self.index_urls
    }

    /// The project page cache
    pub fn cache(&self) -> &ProjectCache {
        &self.cache
    }

    /// Fetch a project's files from every configured index, merged.
    ///
    /// Fails with `PackageNotFound` only when no index knows the project.
    pub async fn fetch_project(&self, name: &Name) -> IndexResult<Arc<ProjectPage>> {
        if let Some(page) = self.cache.get(name) {
            tracing::trace!("{}: project page cache hit", name);
            return Ok(page);
        }

        let mut merged: Option<ProjectPage> = None;
        for base in &self.index_urls {
            let url = base.join(&format!("{}/", name)).map_err(|e| {
                ProvisoError::unavailable(format!("Invalid project URL for {}", name), e)
            })?;

            match with_retry(&self.retry_config, || self.fetch_page(name, &url)).await {
                Ok(page) => match merged.as_mut() {
                    Some(existing) => existing.files.extend(page.files),
                    None => merged = Some(page),
                },
                Err(ProvisoError::PackageNotFound { .. }) => {
                    tracing::debug!("{}: not found on {}", name, base);
                },
                Err(error) => return Err(error),
            }
        }

        let page = Arc::new(merged.ok_or_else(|| ProvisoError::PackageNotFound {
            name: name.to_string(),
        })?);
        self.cache.insert(name.clone(), Arc::clone(&page));
        Ok(page)
    }

    /// Fetch a single project page and make its file URLs absolute
    async fn fetch_page(&self, name: &Name, url: &Url) -> IndexResult<ProjectPage> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, SIMPLE_JSON_MEDIA_TYPE)
            .send()
            .await
            .map_err(|e| ProvisoError::unavailable(format!("Failed to fetch {}", url), e))?;

        match response.status() {
            StatusCode::OK => {
                let page_url = response.url().clone();
                let mut page = response.json::<ProjectPage>().await.map_err(|e| {
                    ProvisoError::unavailable(format!("Failed to parse project page {}", url), e)
                })?;
                for file in &mut page.files {
                    if let Ok(absolute) = page_url.join(&file.url) {
                        file.url = absolute.to_string();
                    }
                }
                Ok(page)
            },
            StatusCode::NOT_FOUND => Err(ProvisoError::PackageNotFound {
                name: name.to_string(),
            }),
            status => Err(ProvisoError::SupplyUnavailable {
                message: format!("Index returned status {} for {}", status, url),
                source: None,
            }),
        }
    }

    /// Files eligible for resolution: not yanked and not too new
    fn eligible<'a>(&'a self, page: &'a ProjectPage) -> impl Iterator<Item = &'a ProjectFile> + 'a {
        page.files.iter().filter(move |file| {
            !file.is_yanked()
                && !self
                    .exclude_newer
                    .as_ref()
                    .is_some_and(|cutoff| file.is_newer_than(cutoff))
        })
    }

    /// All versions published for `name`, ascending
    pub async fn list_versions(&self, name: &Name) -> IndexResult<Vec<Version>> {
        let page = self.fetch_project(name).await?;

        let versions: BTreeSet<Version> = self
            .eligible(&page)
            .filter_map(|file| {
                let parsed = DistFilename::parse(&file.filename, name);
                if parsed.is_none() {
                    tracing::trace!("{}: skipping file {}", name, file.filename);
                }
                parsed
            })
            .map(|parsed| parsed.version)
            .collect();

        tracing::debug!("{}: {} versions", name, versions.len());
        Ok(versions.into_iter().collect())
    }

    /// Declared metadata for one release.
    ///
    /// Reads the core-metadata file of a wheel (or sdist) of that release.
    /// When the index exposes none, the release is reported with no edges.
    pub async fn fetch_metadata(&self, name: &Name, version: &Version) -> IndexResult<PackageMetadata> {
        let page = self.fetch_project(name).await?;

        let mut files: Vec<(DistKind, &ProjectFile)> = page
            .files
            .iter()
            .filter_map(|file| {
                DistFilename::parse(&file.filename, name)
                    .filter(|parsed| parsed.version == *version)
                    .map(|parsed| (parsed.kind, file))
            })
            .collect();
        if files.is_empty() {
            return Err(ProvisoError::PackageNotFound {
                name: format!("{}=={}", name, version),
            });
        }
        // Wheels first
        files.sort_by_key(|(kind, _)| *kind);

        let fallback = || {
            let mut metadata = PackageMetadata::new(name.clone(), Some(version.clone()));
            metadata.requires_python = files.iter().find_map(|(_, file)| file.requires_python());
            metadata
        };

        let Some((_, file)) = files.iter().find(|(_, file)| file.has_core_metadata()) else {
            tracing::warn!("{}=={}: index exposes no core metadata, assuming no dependencies", name, version);
            return Ok(fallback());
        };

        let mut url = Url::parse(&file.url)
            .map_err(|e| ProvisoError::unavailable(format!("Invalid file URL {}", file.url), e))?;
        url.set_fragment(None);
        let url = Url::parse(&format!("{}.metadata", url))
            .map_err(|e| ProvisoError::unavailable(format!("Invalid metadata URL for {}", file.url), e))?;

        match with_retry(&self.retry_config, || self.fetch_text(name, &url)).await {
            Ok(text) => {
                let mut metadata = parse_core_metadata(name, &text);
                if metadata.requires_python.is_none() {
                    metadata.requires_python = file.requires_python();
                }
                Ok(metadata)
            },
            Err(ProvisoError::PackageNotFound { .. }) => {
                tracing::warn!("{}=={}: metadata file missing at {}", name, version, url);
                Ok(fallback())
            },
            Err(error) => Err(error),
        }
    }

    async fn fetch_text(&self, name: &Name, url: &Url) -> IndexResult<String> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ProvisoError::unavailable(format!("Failed to fetch {}", url), e))?;

        match response.status() {
            StatusCode::OK => response
                .text()
                .await
                .map_err(|e| ProvisoError::unavailable(format!("Failed to read {}", url), e)),
            StatusCode::NOT_FOUND => Err(ProvisoError::PackageNotFound {
                name: name.to_string(),
            }),
            status => Err(ProvisoError::SupplyUnavailable {
                message: format!("Index returned status {} for {}", status, url),
                source: None,
            }),
        }
    }
}

/// Build the pooled HTTP client shared by index and schedule requests
pub(crate) fn build_http_client(timeout: Duration) -> IndexResult<Client> {
    ClientBuilder::new()
        // Connection pooling configuration
        .pool_max_idle_per_host(50)
        .pool_idle_timeout(Duration::from_secs(90))
        .timeout(timeout)
        .gzip(true)
        .user_agent(concat!("proviso/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ProvisoError::unavailable("Failed to create HTTP client".to_string(), e))
}

/// Execute an operation with exponential backoff retry logic.
///
/// `PackageNotFound` is final and never retried.
pub(crate) async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> IndexResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = IndexResult<T>>,
{
    let mut delay = config.initial_delay;
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) if error.is_not_found() || attempt >= config.max_retries => return Err(error),
            Err(error) => {
                attempt += 1;
                tracing::debug!("attempt {} failed, retrying in {:?}: {}", attempt, delay, error);
                tokio::time::sleep(delay).await;

                delay = std::cmp::min(
                    Duration::from_millis((delay.as_millis() as f64 * config.multiplier) as u64),
                    config.max_delay,
                );
            },
        }
    }
}
