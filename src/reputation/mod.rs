//! Client IP reputation
//!
//! DNSBL verdicts cached per IP on a [`BoundedCache`] configured with the
//! reputation preset. Concurrent checks for the same IP share one query.
//! Lookup failures are returned to the caller and never cached.

pub mod dnsbl;

pub use dnsbl::{query_name, DnsblResponse, Resolver, SystemResolver, DEFAULT_ZONE};

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::BoundedCache;
use crate::metadata::InFlight;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReputationError {
    #[error("DNSBL lookup for {name} failed: {reason}")]
    Lookup { name: String, reason: String },

    #[error("DNSBL lookup for {name} timed out")]
    Timeout { name: String },
}

/// Reputation check configuration
#[derive(Debug, Clone)]
pub struct ReputationConfig {
    pub zone: String,
    pub timeout: Duration,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            zone: DEFAULT_ZONE.to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Cache instance backing reputation checks
pub type ReputationStore = BoundedCache<IpAddr, DnsblResponse>;

type CheckResult = Result<DnsblResponse, ReputationError>;

pub struct ReputationCache {
    config: ReputationConfig,
    cache: Arc<ReputationStore>,
    resolver: Arc<dyn Resolver>,
    inflight: InFlight<IpAddr, CheckResult>,
}

impl ReputationCache {
    pub fn new(
        config: ReputationConfig,
        cache: Arc<ReputationStore>,
        resolver: Arc<dyn Resolver>,
    ) -> Self {
        info!(zone = %config.zone, "Reputation cache initialized");
        Self {
            config,
            cache,
            resolver,
            inflight: InFlight::new(),
        }
    }

    pub fn with_system_resolver(config: ReputationConfig, cache: Arc<ReputationStore>) -> Self {
        Self::new(config, cache, Arc::new(SystemResolver))
    }

    pub fn cache(&self) -> &Arc<ReputationStore> {
        &self.cache
    }

    /// Blocklist verdict for `ip`
    pub async fn check(&self, ip: IpAddr) -> CheckResult {
        if let Some(verdict) = self.cache.get(&ip) {
            return Ok(verdict);
        }
        self.inflight.run(&ip, || self.lookup_and_store(ip)).await
    }

    async fn lookup_and_store(&self, ip: IpAddr) -> CheckResult {
        if let Some(verdict) = self.cache.get(&ip) {
            return Ok(verdict);
        }

        let name = query_name(ip, &self.config.zone);
        let addrs = match tokio::time::timeout(self.config.timeout, self.resolver.lookup(&name)).await
        {
            Ok(Ok(addrs)) => addrs,
            Ok(Err(e)) => {
                warn!(ip = %ip, error = %e, "DNSBL lookup failed");
                return Err(e);
            }
            Err(_) => {
                warn!(ip = %ip, "DNSBL lookup timed out");
                return Err(ReputationError::Timeout { name });
            }
        };

        let verdict = dnsbl::classify(&addrs);
        self.cache.set(ip, verdict, 1);
        self.cache.wait().await;
        debug!(ip = %ip, verdict = %verdict, "DNSBL verdict cached");
        Ok(verdict)
    }
}
