//! Origin metadata (Open Graph) pipeline
//!
//! Challenge pages show link previews of the page the visitor asked for. The
//! tags come from the protected origin, so every lookup is cached and
//! concurrent misses for the same resource share one outbound fetch.
//!
//! ```text
//! get_metadata(url, host)
//!   ├─ key = target [| host]
//!   ├─ cache hit ───────────────────────────────► tags / None
//!   └─ miss ─► in-flight registry (one leader per key)
//!                └─ fetch ─► FetchOutcome
//!                     ├─ Success            ─► cache (ttl), wait ─► tags
//!                     ├─ ConnectionRefused  ─► None
//!                     ├─ Handled            ─► cache absent (ttl) ─► None
//!                     └─ Failed             ─► error (timeouts cached absent for ttl/2)
//! ```

pub mod extract;
pub mod fetch;
pub mod inflight;
pub mod pipeline;
pub mod presentation;

pub use extract::TagExtractor;
pub use fetch::{FetchFailure, FetchOutcome, HandledReason, HttpFetcher, OriginFetcher};
pub use inflight::InFlight;
pub use pipeline::{CachedMetadata, MetadataCache, MetadataPipeline, MetadataResult};
pub use presentation::Presentation;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use crate::cache::METADATA_DEFAULT_TTL;

/// Origin assumed when none is configured
pub const DEFAULT_TARGET: &str = "http://localhost:3923";

// ============================================================================
// Errors
// ============================================================================

/// Errors that cross the pipeline boundary
///
/// Refused connections and handled upstream conditions never show up here;
/// they resolve to `Ok(None)`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MetadataError {
    /// Missing or unusable target, rejected before any I/O
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The origin did not answer within the configured timeout
    #[error("Origin request timed out: {target}")]
    Timeout { target: String },

    /// Any other fetch failure
    #[error("Origin fetch failed for {target}: {reason}")]
    Fetch { target: String, reason: String },

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Client(String),
}

// ============================================================================
// Tags
// ============================================================================

/// Extracted metadata, tag name (lowercase) -> content
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataTags(BTreeMap<String, String>);

impl MetadataTags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tag unless one with the same name already exists
    ///
    /// Returns whether the tag was inserted.
    pub fn insert(&mut self, name: &str, content: &str) -> bool {
        let name = name.to_ascii_lowercase();
        if self.0.contains_key(&name) {
            return false;
        }
        self.0.insert(name, content.to_string());
        true
    }

    /// Case-insensitive lookup
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// `og:title`, which also carries the `<title>` fallback
    pub fn title(&self) -> Option<&str> {
        self.get("og:title")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for MetadataTags {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut tags = Self::new();
        for (name, content) in iter {
            tags.insert(name, content);
        }
        tags
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Metadata pipeline configuration
#[derive(Debug, Clone)]
pub struct MetadataConfig {
    /// Whether metadata is fetched at all (Open Graph passthrough)
    pub enabled: bool,
    /// Origin the gateway protects
    pub target: Url,
    /// Lifetime of cached tags (zero = [`METADATA_DEFAULT_TTL`])
    pub ttl: Duration,
    /// Cache separately per virtual host
    pub consider_host: bool,
    /// Cache separately per query string
    pub query_distinct: bool,
    /// Outbound request timeout
    pub timeout: Duration,
    /// Response bodies are truncated past this many bytes
    pub max_content_length: usize,
    /// Exact `<meta>` names to keep
    pub approved_tags: Vec<String>,
    /// `<meta>` name prefixes to keep
    pub approved_prefixes: Vec<String>,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // DEFAULT_TARGET is a literal absolute URL; parsing it cannot fail
            target: Url::parse(DEFAULT_TARGET).expect("DEFAULT_TARGET is a valid URL"),
            ttl: METADATA_DEFAULT_TTL,
            consider_host: false,
            query_distinct: false,
            timeout: Duration::from_secs(5),
            max_content_length: 16 << 20, // 16 MiB
            approved_tags: vec!["description".into(), "keywords".into(), "author".into()],
            approved_prefixes: vec!["og:".into(), "twitter:".into(), "fediverse:".into()],
        }
    }
}

impl MetadataConfig {
    /// Configured TTL, or the default when unset
    pub fn effective_ttl(&self) -> Duration {
        if self.ttl.is_zero() {
            METADATA_DEFAULT_TTL
        } else {
            self.ttl
        }
    }
}
