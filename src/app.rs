//! Application wiring
//!
//! Builds both cache instances and the services on top of them from [`Args`],
//! and runs the CLI lookups.

use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::cache::{BoundedCache, CacheStats};
use crate::config::Args;
use crate::metadata::{MetadataPipeline, Presentation};
use crate::reputation::{DnsblResponse, ReputationCache};
use crate::types::{Result, WardenError};

/// Shared services, one instance per process
pub struct Warden {
    pub metadata: MetadataPipeline,
    pub reputation: ReputationCache,
}

/// Result of a metadata lookup, as printed by the CLI
#[derive(Debug, Clone, Serialize)]
pub struct MetadataReport {
    pub url: String,
    pub presentation: Presentation,
    /// Set when the lookup failed and the fallback was used
    pub error: Option<String>,
    pub cache: CacheStats,
}

/// Result of a reputation check, as printed by the CLI
#[derive(Debug, Clone, Serialize)]
pub struct ReputationReport {
    pub ip: IpAddr,
    pub verdict: Option<DnsblResponse>,
    pub listed: bool,
    pub error: Option<String>,
}

impl Warden {
    /// Construct caches and services; must run inside a Tokio runtime
    pub fn from_args(args: &Args) -> Result<Self> {
        args.validate().map_err(WardenError::Config)?;

        let metadata_cache = Arc::new(BoundedCache::new(args.metadata_cache_config()));
        let metadata = MetadataPipeline::with_http(args.metadata_config(), metadata_cache)?;

        let reputation_cache = Arc::new(BoundedCache::new(args.reputation_cache_config()));
        let reputation =
            ReputationCache::with_system_resolver(args.reputation_config(), reputation_cache);

        info!(node_id = %args.node_id, "Warden services ready");
        Ok(Self {
            metadata,
            reputation,
        })
    }

    /// Look up a page's metadata and reduce it to what the renderer needs
    pub async fn describe(&self, url: &Url, host: &str, default_title: &str) -> MetadataReport {
        let result = self.metadata.get_metadata(Some(url), host).await;
        MetadataReport {
            url: url.to_string(),
            presentation: Presentation::resolve(&result, default_title),
            error: result.err().map(|e| e.to_string()),
            cache: self.metadata.cache().stats(),
        }
    }

    pub async fn check(&self, ip: IpAddr) -> ReputationReport {
        match self.reputation.check(ip).await {
            Ok(verdict) => ReputationReport {
                ip,
                verdict: Some(verdict),
                listed: verdict.is_listed(),
                error: None,
            },
            Err(e) => ReputationReport {
                ip,
                verdict: None,
                listed: false,
                error: Some(e.to_string()),
            },
        }
    }
}
