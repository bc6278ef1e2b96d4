//! Metadata fetch pipeline
//!
//! Key derivation, cache lookup, single-flight fetch, outcome classification
//! and population, in that order.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::fetch::{FetchFailure, FetchOutcome, HttpFetcher, OriginFetcher};
use super::inflight::InFlight;
use super::{MetadataConfig, MetadataError, MetadataTags};
use crate::cache::{BoundedCache, MetadataCacheKey};

/// What the metadata cache holds per key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedMetadata {
    /// Tags from a successful fetch, shared read-only between callers
    Found(Arc<MetadataTags>),
    /// The origin was reachable but had nothing usable
    Absent,
}

impl CachedMetadata {
    pub fn into_option(self) -> Option<Arc<MetadataTags>> {
        match self {
            CachedMetadata::Found(tags) => Some(tags),
            CachedMetadata::Absent => None,
        }
    }
}

/// `Ok(None)` means "no metadata, use the fallback"
pub type MetadataResult = Result<Option<Arc<MetadataTags>>, MetadataError>;

/// Cache instance backing the pipeline
pub type MetadataCache = BoundedCache<MetadataCacheKey, CachedMetadata>;

pub struct MetadataPipeline {
    config: MetadataConfig,
    cache: Arc<MetadataCache>,
    fetcher: Arc<dyn OriginFetcher>,
    inflight: InFlight<MetadataCacheKey, MetadataResult>,
}

impl MetadataPipeline {
    pub fn new(
        config: MetadataConfig,
        cache: Arc<MetadataCache>,
        fetcher: Arc<dyn OriginFetcher>,
    ) -> Self {
        info!(
            enabled = config.enabled,
            target = %config.target,
            ttl_secs = config.effective_ttl().as_secs(),
            consider_host = config.consider_host,
            "Metadata pipeline initialized"
        );
        Self {
            config,
            cache,
            fetcher,
            inflight: InFlight::new(),
        }
    }

    /// Pipeline backed by the reqwest fetcher
    pub fn with_http(
        config: MetadataConfig,
        cache: Arc<MetadataCache>,
    ) -> Result<Self, MetadataError> {
        let fetcher = HttpFetcher::new(&config)?;
        Ok(Self::new(config, cache, Arc::new(fetcher)))
    }

    pub fn config(&self) -> &MetadataConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// Origin URL for a request URL: target origin + request path (+ query)
    pub fn resolve_target(&self, url: &Url) -> Url {
        let mut target = self.config.target.clone();
        let base = self.config.target.path().trim_end_matches('/');
        target.set_path(&format!("{}{}", base, url.path()));
        let query = if self.config.query_distinct {
            url.query()
        } else {
            None
        };
        target.set_query(query);
        target.set_fragment(None);
        target
    }

    pub fn cache_key(&self, target: &Url, original_host: &str) -> MetadataCacheKey {
        MetadataCacheKey::new(target.as_str(), original_host, self.config.consider_host)
    }

    /// Metadata for the page at `url`, as served under `original_host`
    pub async fn get_metadata(&self, url: Option<&Url>, original_host: &str) -> MetadataResult {
        let url = url.ok_or_else(|| {
            MetadataError::InvalidInput("no URL provided, cannot get metadata".into())
        })?;
        if !self.config.enabled {
            return Ok(None);
        }

        let target = self.resolve_target(url);
        let key = self.cache_key(&target, original_host);

        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.into_option());
        }

        self.inflight
            .run(&key, || self.fetch_and_store(&key, &target, original_host))
            .await
    }

    async fn fetch_and_store(
        &self,
        key: &MetadataCacheKey,
        target: &Url,
        original_host: &str,
    ) -> MetadataResult {
        // A flight that finished just before ours was registered already populated it
        if let Some(cached) = self.cache.get(key) {
            return Ok(cached.into_option());
        }

        let ttl = self.config.effective_ttl();
        match self.fetcher.fetch(target, original_host).await {
            FetchOutcome::Success(tags) => {
                let tags = Arc::new(tags);
                self.cache
                    .set_with_ttl(key.clone(), CachedMetadata::Found(Arc::clone(&tags)), 1, ttl);
                self.cache.wait().await;
                debug!(key = %key, tags = tags.len(), "Metadata fetched");
                Ok(Some(tags))
            }
            FetchOutcome::ConnectionRefused => {
                debug!(key = %key, "Origin refused connection, no metadata");
                Ok(None)
            }
            FetchOutcome::Handled(reason) => {
                debug!(key = %key, reason = %reason, "No usable metadata from origin");
                self.store_absent(key, ttl).await;
                Ok(None)
            }
            FetchOutcome::Failed(FetchFailure::Timeout) => {
                warn!(key = %key, timeout_ms = self.config.timeout.as_millis() as u64, "Metadata fetch timed out");
                self.store_absent(key, ttl / 2).await;
                Err(MetadataError::Timeout {
                    target: target.to_string(),
                })
            }
            FetchOutcome::Failed(FetchFailure::Other(reason)) => {
                warn!(key = %key, error = %reason, "Metadata fetch failed");
                Err(MetadataError::Fetch {
                    target: target.to_string(),
                    reason,
                })
            }
        }
    }

    /// Negative entry: hits return `Ok(None)` without I/O until it expires.
    /// Handled outcomes keep it for the full TTL, timeouts for half.
    async fn store_absent(&self, key: &MetadataCacheKey, ttl: Duration) {
        self.cache
            .set_with_ttl(key.clone(), CachedMetadata::Absent, 1, ttl);
        self.cache.wait().await;
    }
}
