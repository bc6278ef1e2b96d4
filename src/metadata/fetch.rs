//! Origin document fetching
//!
//! The fetch step never returns an error value. Every result is one of the
//! [`FetchOutcome`] variants, and the pipeline decides caching and
//! propagation by matching on it.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HOST};
use reqwest::StatusCode;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use tracing::debug;
use url::Url;

use super::extract::TagExtractor;
use super::{MetadataConfig, MetadataError, MetadataTags};

const ACCEPTED_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

/// Result of one outbound metadata fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Document fetched and parsed (the mapping may be empty)
    Success(MetadataTags),
    /// Origin refused the connection
    ConnectionRefused,
    /// Upstream condition already classified and logged by the fetcher
    Handled(HandledReason),
    /// Anything else
    Failed(FetchFailure),
}

/// Recoverable upstream conditions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandledReason {
    /// Origin answered with something other than 200
    Status(u16),
    /// Origin answered with a document that is not HTML
    ContentType(String),
}

impl fmt::Display for HandledReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandledReason::Status(code) => write!(f, "status {}", code),
            HandledReason::ContentType(ct) => write!(f, "content type {:?}", ct),
        }
    }
}

/// Unclassified fetch failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    Timeout,
    Other(String),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::Timeout => f.write_str("timed out"),
            FetchFailure::Other(reason) => f.write_str(reason),
        }
    }
}

/// Retrieves and parses one origin document
#[async_trait]
pub trait OriginFetcher: Send + Sync {
    async fn fetch(&self, target: &Url, original_host: &str) -> FetchOutcome;
}

// ============================================================================
// HTTP Fetcher
// ============================================================================

/// reqwest-backed [`OriginFetcher`]
pub struct HttpFetcher {
    client: reqwest::Client,
    extractor: TagExtractor,
    max_content_length: usize,
}

impl HttpFetcher {
    pub fn new(config: &MetadataConfig) -> Result<Self, MetadataError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("warden/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MetadataError::Client(e.to_string()))?;

        Ok(Self {
            client,
            extractor: TagExtractor::from_config(config),
            max_content_length: config.max_content_length,
        })
    }

    async fn read_body(
        &self,
        mut response: reqwest::Response,
    ) -> Result<Vec<u8>, reqwest::Error> {
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let remaining = self.max_content_length - body.len();
            if chunk.len() >= remaining {
                body.extend_from_slice(&chunk[..remaining]);
                debug!(limit = self.max_content_length, "Origin body truncated");
                break;
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl OriginFetcher for HttpFetcher {
    async fn fetch(&self, target: &Url, original_host: &str) -> FetchOutcome {
        let mut request = self
            .client
            .get(target.clone())
            .header(ACCEPT, "text/html, application/xhtml+xml");
        if !original_host.is_empty() {
            request = request.header(HOST, original_host);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return classify_error(&e),
        };

        let status = response.status();
        if status != StatusCode::OK {
            debug!(target = %target, status = status.as_u16(), "Origin returned non-OK status");
            return FetchOutcome::Handled(HandledReason::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !is_html(&content_type) {
            debug!(target = %target, content_type = %content_type, "Origin returned non-HTML content");
            return FetchOutcome::Handled(HandledReason::ContentType(content_type));
        }

        let body = match self.read_body(response).await {
            Ok(body) => body,
            Err(e) => return classify_error(&e),
        };

        let html = String::from_utf8_lossy(&body);
        FetchOutcome::Success(self.extractor.extract(&html))
    }
}

fn is_html(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    ACCEPTED_CONTENT_TYPES.contains(&mime.as_str())
}

fn classify_error(err: &reqwest::Error) -> FetchOutcome {
    if is_connection_refused(err) {
        FetchOutcome::ConnectionRefused
    } else if err.is_timeout() {
        FetchOutcome::Failed(FetchFailure::Timeout)
    } else {
        FetchOutcome::Failed(FetchFailure::Other(err.to_string()))
    }
}

/// Walk the source chain looking for an `ECONNREFUSED`
pub(crate) fn is_connection_refused(err: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        current = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Wrapper(io::Error);

    impl fmt::Display for Wrapper {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "wrapped: {}", self.0)
        }
    }

    impl StdError for Wrapper {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_connection_refused_in_chain() {
        let err = Wrapper(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert!(is_connection_refused(&err));

        let err = Wrapper(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(!is_connection_refused(&err));
    }

    #[test]
    fn test_is_html() {
        assert!(is_html("text/html"));
        assert!(is_html("text/html; charset=utf-8"));
        assert!(is_html("Application/XHTML+XML"));
        assert!(!is_html("application/json"));
        assert!(!is_html(""));
    }

    #[test]
    fn test_display() {
        assert_eq!(HandledReason::Status(404).to_string(), "status 404");
        assert_eq!(FetchFailure::Timeout.to_string(), "timed out");
    }

    #[tokio::test]
    async fn test_refused_port_classified() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let fetcher = HttpFetcher::new(&MetadataConfig::default()).unwrap();
        let target = Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap();
        assert_eq!(
            fetcher.fetch(&target, "").await,
            FetchOutcome::ConnectionRefused
        );
    }
}
