//! Caching layer for Warden
//!
//! Provides a bounded, cost-aware in-memory cache shared by every request
//! handling task. The same engine backs both logical caches the gateway runs:
//!
//! - **Reputation cache**: DNSBL verdicts per client IP (hours-long TTL)
//! - **Metadata cache**: Open Graph tags fetched from the origin (minutes-long TTL)
//!
//! ## Engine
//!
//! - [`store::BoundedCache`] holds entries in a sharded map; reads never wait
//!   on writers.
//! - Admission and eviction run on a background task fed by a bounded queue.
//!   When the queue is full, bookkeeping is dropped instead of blocking.
//! - [`policy::AdmissionPolicy`] keeps total cost under `max_cost` and prefers
//!   frequently read keys, using the approximate counts in [`sketch`].
//! - TTL is checked on every read and swept periodically, independent of eviction.

pub mod keys;
pub mod policy;
pub mod sketch;
pub mod store;

pub use keys::MetadataCacheKey;
pub use policy::{Admission, AdmissionPolicy};
pub use sketch::FrequencySketch;
pub use store::{BoundedCache, CacheStats};

use std::time::Duration;

use crate::types::{Result, WardenError};

/// Fallback TTL for reputation verdicts
pub const REPUTATION_DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Fallback TTL for origin metadata
pub const METADATA_DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

/// Longest TTL a configuration may ask for
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Construction-time configuration for one cache instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Number of counters in the frequency sketch
    pub num_counters: usize,
    /// Total admission budget, in caller-assigned cost units
    pub max_cost: u64,
    /// Depth of the bookkeeping queue
    pub buffer_items: usize,
    /// TTL applied when the caller supplies none (zero = never expires)
    pub default_ttl: Duration,
    /// How often expired entries are swept
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::metadata()
    }
}

impl CacheConfig {
    /// Reputation (DNSBL) cache defaults
    pub fn reputation() -> Self {
        Self {
            num_counters: 1_000_000,
            max_cost: 1 << 20, // 1 MB-equivalent
            buffer_items: 64,
            default_ttl: REPUTATION_DEFAULT_TTL,
            cleanup_interval: Duration::from_secs(1),
        }
    }

    /// Open Graph metadata cache defaults
    pub fn metadata() -> Self {
        Self {
            num_counters: 1_000_000,
            max_cost: 1 << 20,
            buffer_items: 64,
            default_ttl: METADATA_DEFAULT_TTL,
            cleanup_interval: Duration::from_secs(1),
        }
    }

    /// Apply `<PREFIX>_*` environment overrides on top of `self`
    ///
    /// Recognised: `_NUM_COUNTERS`, `_MAX_COST`, `_BUFFER_ITEMS`, `_TTL_SECS`.
    pub fn from_env(prefix: &str, base: Self) -> Self {
        let mut config = base;

        if let Some(v) = env_parse::<usize>(prefix, "NUM_COUNTERS") {
            config.num_counters = v;
        }
        if let Some(v) = env_parse::<u64>(prefix, "MAX_COST") {
            config.max_cost = v;
        }
        if let Some(v) = env_parse::<usize>(prefix, "BUFFER_ITEMS") {
            config.buffer_items = v;
        }
        if let Some(v) = env_parse::<u64>(prefix, "TTL_SECS") {
            config.default_ttl = Duration::from_secs(v);
        }

        config
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.num_counters == 0 {
            return Err(WardenError::Config("num_counters must be > 0".into()));
        }
        if self.max_cost == 0 {
            return Err(WardenError::Config("max_cost must be > 0".into()));
        }
        if self.buffer_items == 0 {
            return Err(WardenError::Config("buffer_items must be > 0".into()));
        }
        if self.default_ttl > MAX_TTL {
            return Err(WardenError::Config(format!(
                "default_ttl must be at most {}s",
                MAX_TTL.as_secs()
            )));
        }
        if self.cleanup_interval.is_zero() {
            return Err(WardenError::Config("cleanup_interval must be > 0".into()));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(prefix: &str, name: &str) -> Option<T> {
    std::env::var(format!("{}_{}", prefix, name))
        .ok()
        .and_then(|s| s.parse().ok())
}
