//! HTML metadata extraction
//!
//! Walks an html5ever DOM and keeps approved `<meta>` tags. The document
//! `<title>` backs `og:title` when the page has no richer title tag.

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use html5ever::tree_builder::TreeBuilderOpts;
use html5ever::ParseOpts;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

use super::{MetadataConfig, MetadataTags};

const TITLE_TAG: &str = "og:title";

/// Extracts approved tags from an HTML document
#[derive(Debug, Clone)]
pub struct TagExtractor {
    approved_tags: Vec<String>,
    approved_prefixes: Vec<String>,
}

impl Default for TagExtractor {
    fn default() -> Self {
        Self::from_config(&MetadataConfig::default())
    }
}

impl TagExtractor {
    pub fn new(approved_tags: Vec<String>, approved_prefixes: Vec<String>) -> Self {
        Self {
            approved_tags: approved_tags
                .into_iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
            approved_prefixes: approved_prefixes
                .into_iter()
                .map(|p| p.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &MetadataConfig) -> Self {
        Self::new(
            config.approved_tags.clone(),
            config.approved_prefixes.clone(),
        )
    }

    /// Whether a (lowercased) tag name is kept
    pub fn is_approved(&self, name: &str) -> bool {
        self.approved_tags.iter().any(|t| t == name)
            || self.approved_prefixes.iter().any(|p| name.starts_with(p))
    }

    /// Parse `html` and collect its tags
    ///
    /// Never fails: html5ever recovers from any malformed input, so the worst
    /// case is an empty mapping.
    pub fn extract(&self, html: &str) -> MetadataTags {
        let opts = ParseOpts {
            tree_builder: TreeBuilderOpts {
                scripting_enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let dom = parse_document(RcDom::default(), opts).one(html);

        let mut tags = MetadataTags::new();
        let mut title: Option<String> = None;
        self.walk(&dom.document, &mut tags, &mut title);

        if let Some(title) = title {
            tags.insert(TITLE_TAG, &title);
        }
        tags
    }

    fn walk(&self, node: &Handle, tags: &mut MetadataTags, title: &mut Option<String>) {
        if let NodeData::Element { name, attrs, .. } = &node.data {
            match &*name.local {
                "meta" => {
                    let attrs = attrs.borrow();
                    let mut tag_name = None;
                    let mut content = None;
                    for attr in attrs.iter() {
                        match &*attr.name.local {
                            "property" | "name" if tag_name.is_none() => {
                                tag_name = Some(attr.value.to_ascii_lowercase());
                            }
                            "content" => content = Some(attr.value.to_string()),
                            _ => {}
                        }
                    }
                    if let (Some(tag_name), Some(content)) = (tag_name, content) {
                        if self.is_approved(&tag_name) {
                            tags.insert(&tag_name, &content);
                        }
                    }
                }
                "title" if title.is_none() => {
                    let text = text_content(node);
                    let text = text.trim();
                    if !text.is_empty() {
                        *title = Some(text.to_string());
                    }
                }
                _ => {}
            }
        }

        for child in node.children.borrow().iter() {
            self.walk(child, tags, title);
        }
    }
}

fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    for child in node.children.borrow().iter() {
        if let NodeData::Text { contents } = &child.data {
            out.push_str(&contents.borrow());
        }
    }
    out
}
