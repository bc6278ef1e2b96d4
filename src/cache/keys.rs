//! Cache key definitions
//!
//! Keys for the Open Graph metadata cache.

use std::fmt;

/// Cache key for one origin resource's metadata
///
/// Same target (and, when host consideration is on, same host) always yields
/// the same key; a differing host yields a differing key only when
/// `consider_host` is set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetadataCacheKey {
    /// Resolved origin URL (origin + path, plus query when query-distinct)
    pub target: String,
    /// Original request host, only present when host is considered
    pub host: Option<String>,
}

impl MetadataCacheKey {
    /// Create a key for a resolved target
    pub fn new(target: &str, original_host: &str, consider_host: bool) -> Self {
        Self {
            target: target.to_string(),
            host: consider_host.then(|| original_host.to_string()),
        }
    }

    /// Convert to storage key string
    /// Format: target or target|host
    pub fn to_storage_key(&self) -> String {
        match &self.host {
            Some(host) => format!("{}|{}", self.target, host),
            None => self.target.clone(),
        }
    }
}

impl fmt::Display for MetadataCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_storage_key())
    }
}
