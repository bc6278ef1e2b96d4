//! Configuration for Warden
//!
//! CLI arguments and environment variable handling using clap. Every flag can
//! also be set through the environment (and therefore a `.env` file).

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use crate::cache::{CacheConfig, METADATA_DEFAULT_TTL};
use crate::metadata::{MetadataConfig, DEFAULT_TARGET};
use crate::reputation::{ReputationConfig, DEFAULT_ZONE};

/// Warden - request classification front door
#[derive(Parser, Debug, Clone)]
#[command(name = "warden")]
#[command(about = "Origin metadata and client reputation lookups for the challenge gateway")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Open Graph passthrough configuration
    #[command(flatten)]
    pub og: OgArgs,

    /// DNSBL configuration
    #[command(flatten)]
    pub dnsbl: DnsblArgs,

    /// Cache sizing
    #[command(flatten)]
    pub cache: CacheArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Fetch (through the cache) the Open Graph tags for a page
    Metadata {
        /// Public URL of the page
        url: Url,

        /// Host header the visitor sent
        #[arg(long, default_value = "")]
        host: String,

        /// Title used when the origin has none
        #[arg(long, default_value = "Making sure you're not a bot!")]
        default_title: String,

        /// Repeat the lookup this many times (later lookups hit the cache)
        #[arg(long, default_value = "1")]
        repeat: usize,
    },

    /// Check client addresses against the DNS blocklist
    Reputation {
        #[arg(required = true)]
        ips: Vec<IpAddr>,
    },
}

/// Open Graph passthrough configuration
#[derive(Parser, Debug, Clone)]
pub struct OgArgs {
    /// Fetch Open Graph tags from the origin
    #[arg(long, env = "OG_PASSTHROUGH", default_value = "true", action = ArgAction::Set)]
    pub og_passthrough: bool,

    /// Origin the gateway protects
    #[arg(long, env = "TARGET", default_value = DEFAULT_TARGET)]
    pub target: Url,

    /// Lifetime of cached tags in seconds (0 = default)
    #[arg(long, env = "OG_EXPIRY_TIME", default_value_t = METADATA_DEFAULT_TTL.as_secs())]
    pub og_expiry_time: u64,

    /// Cache tags separately per Host header
    #[arg(long, env = "OG_CACHE_CONSIDER_HOST", default_value = "false")]
    pub og_cache_consider_host: bool,

    /// Cache tags separately per query string
    #[arg(long, env = "OG_QUERY_DISTINCT", default_value = "false")]
    pub og_query_distinct: bool,

    /// Origin request timeout in milliseconds
    #[arg(long, env = "OG_TIMEOUT_MS", default_value = "5000")]
    pub og_timeout_ms: u64,

    /// Origin bodies are truncated past this many bytes
    #[arg(long, env = "OG_MAX_CONTENT_LENGTH", default_value_t = 16 << 20)]
    pub og_max_content_length: usize,
}

/// DNSBL configuration
#[derive(Parser, Debug, Clone)]
pub struct DnsblArgs {
    /// Blocklist zone queried for client addresses
    #[arg(long, env = "DNSBL_ZONE", default_value = DEFAULT_ZONE)]
    pub dnsbl_zone: String,

    /// DNS query timeout in milliseconds
    #[arg(long, env = "DNSBL_TIMEOUT_MS", default_value = "5000")]
    pub dnsbl_timeout_ms: u64,

    /// Lifetime of cached verdicts in seconds (default 24h)
    #[arg(long, env = "DNSBL_TTL")]
    pub dnsbl_ttl: Option<u64>,
}

/// Per-instance cache sizing
///
/// Unset flags fall back to the `OG_CACHE_*` / `DNSBL_CACHE_*` environment
/// (see [`CacheConfig::from_env`]) and then to the instance preset.
#[derive(Parser, Debug, Clone)]
pub struct CacheArgs {
    /// Frequency sketch counters (metadata cache)
    #[arg(long)]
    pub og_cache_num_counters: Option<usize>,

    /// Cost budget (metadata cache)
    #[arg(long)]
    pub og_cache_max_cost: Option<u64>,

    /// Bookkeeping queue depth (metadata cache)
    #[arg(long)]
    pub og_cache_buffer_items: Option<usize>,

    /// Frequency sketch counters (reputation cache)
    #[arg(long)]
    pub dnsbl_cache_num_counters: Option<usize>,

    /// Cost budget (reputation cache)
    #[arg(long)]
    pub dnsbl_cache_max_cost: Option<u64>,

    /// Bookkeeping queue depth (reputation cache)
    #[arg(long)]
    pub dnsbl_cache_buffer_items: Option<usize>,
}

impl CacheArgs {
    fn apply(
        base: CacheConfig,
        num_counters: Option<usize>,
        max_cost: Option<u64>,
        buffer_items: Option<usize>,
    ) -> CacheConfig {
        CacheConfig {
            num_counters: num_counters.unwrap_or(base.num_counters),
            max_cost: max_cost.unwrap_or(base.max_cost),
            buffer_items: buffer_items.unwrap_or(base.buffer_items),
            ..base
        }
    }
}

impl Args {
    pub fn metadata_config(&self) -> MetadataConfig {
        MetadataConfig {
            enabled: self.og.og_passthrough,
            target: self.og.target.clone(),
            ttl: Duration::from_secs(self.og.og_expiry_time),
            consider_host: self.og.og_cache_consider_host,
            query_distinct: self.og.og_query_distinct,
            timeout: Duration::from_millis(self.og.og_timeout_ms),
            max_content_length: self.og.og_max_content_length,
            ..Default::default()
        }
    }

    /// Metadata cache sizing; its TTL always follows `OG_EXPIRY_TIME`
    pub fn metadata_cache_config(&self) -> CacheConfig {
        let base = CacheConfig::from_env("OG_CACHE", CacheConfig::metadata());
        CacheConfig {
            default_ttl: self.metadata_config().effective_ttl(),
            ..CacheArgs::apply(
                base,
                self.cache.og_cache_num_counters,
                self.cache.og_cache_max_cost,
                self.cache.og_cache_buffer_items,
            )
        }
    }

    pub fn reputation_config(&self) -> ReputationConfig {
        ReputationConfig {
            zone: self.dnsbl.dnsbl_zone.clone(),
            timeout: Duration::from_millis(self.dnsbl.dnsbl_timeout_ms),
        }
    }

    pub fn reputation_cache_config(&self) -> CacheConfig {
        let base = CacheConfig::from_env("DNSBL_CACHE", CacheConfig::reputation());
        let mut config = CacheArgs::apply(
            base,
            self.cache.dnsbl_cache_num_counters,
            self.cache.dnsbl_cache_max_cost,
            self.cache.dnsbl_cache_buffer_items,
        );
        if let Some(secs) = self.dnsbl.dnsbl_ttl {
            config.default_ttl = Duration::from_secs(secs);
        }
        config
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !matches!(self.og.target.scheme(), "http" | "https") {
            return Err(format!(
                "TARGET must be an http(s) URL, got {}",
                self.og.target
            ));
        }
        if self.og.og_timeout_ms == 0 {
            return Err("OG_TIMEOUT_MS must be > 0".to_string());
        }
        if self.dnsbl.dnsbl_zone.trim_matches('.').is_empty() {
            return Err("DNSBL_ZONE must not be empty".to_string());
        }

        self.metadata_cache_config()
            .validate()
            .map_err(|e| format!("metadata cache: {}", e))?;
        self.reputation_cache_config()
            .validate()
            .map_err(|e| format!("reputation cache: {}", e))?;

        Ok(())
    }
}
