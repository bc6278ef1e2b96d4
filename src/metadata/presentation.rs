//! Renderer-facing view of a metadata lookup
//!
//! Errors and empty results both turn into the default presentation; the
//! renderer never sees a failure.

use serde::Serialize;
use tracing::debug;

use super::MetadataResult;

/// Page title plus the meta tags to emit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Presentation {
    pub title: String,
    /// `(name, content)` pairs in name order
    pub tags: Vec<(String, String)>,
    /// Whether any of this came from the origin
    pub from_origin: bool,
}

impl Presentation {
    pub fn fallback(default_title: &str) -> Self {
        Self {
            title: default_title.to_string(),
            tags: Vec::new(),
            from_origin: false,
        }
    }

    pub fn resolve(result: &MetadataResult, default_title: &str) -> Self {
        let tags = match result {
            Ok(Some(tags)) if !tags.is_empty() => tags,
            Ok(_) => return Self::fallback(default_title),
            Err(e) => {
                debug!(error = %e, "Using default presentation");
                return Self::fallback(default_title);
            }
        };

        Self {
            title: tags.title().unwrap_or(default_title).to_string(),
            tags: tags
                .iter()
                .map(|(name, content)| (name.to_string(), content.to_string()))
                .collect(),
            from_origin: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MetadataError, MetadataTags};
    use std::sync::Arc;

    #[test]
    fn test_origin_title_used() {
        let tags: MetadataTags = [("og:title", "OG Title"), ("description", "d")]
            .into_iter()
            .collect();
        let p = Presentation::resolve(&Ok(Some(Arc::new(tags))), "Making sure you're not a bot!");
        assert_eq!(p.title, "OG Title");
        assert_eq!(p.tags.len(), 2);
        assert!(p.from_origin);
    }

    #[test]
    fn test_tags_without_title_keep_default_title() {
        let tags: MetadataTags = [("description", "d")].into_iter().collect();
        let p = Presentation::resolve(&Ok(Some(Arc::new(tags))), "Default");
        assert_eq!(p.title, "Default");
        assert_eq!(p.tags, vec![("description".to_string(), "d".to_string())]);
    }

    #[test]
    fn test_fallbacks() {
        assert_eq!(
            Presentation::resolve(&Ok(None), "Default"),
            Presentation::fallback("Default")
        );
        assert_eq!(
            Presentation::resolve(&Ok(Some(Arc::new(MetadataTags::new()))), "Default"),
            Presentation::fallback("Default")
        );
        let err = Err(MetadataError::Timeout {
            target: "http://origin/".into(),
        });
        assert_eq!(
            Presentation::resolve(&err, "Default"),
            Presentation::fallback("Default")
        );
    }
}
