//! End-to-end tests for the metadata pipeline against a mock origin.
//!
//! Uses wiremock to stand up the origin. Covers extraction precedence, status
//! and content-type handling, refused connections, Host forwarding, timeouts
//! and request deduplication.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use url::Url;
use warden::cache::{BoundedCache, CacheConfig};
use warden::metadata::{MetadataConfig, MetadataError, MetadataPipeline, Presentation};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FALLBACK: &str = "Making sure you're not a bot!";

fn pipeline_for(target: &str, tweak: impl FnOnce(&mut MetadataConfig)) -> MetadataPipeline {
    let mut config = MetadataConfig {
        enabled: true,
        target: Url::parse(target).expect("valid target"),
        ..Default::default()
    };
    tweak(&mut config);

    let cache = Arc::new(BoundedCache::new(CacheConfig {
        num_counters: 1024,
        ..CacheConfig::metadata()
    }));
    MetadataPipeline::with_http(config, cache).expect("failed to create pipeline")
}

fn page(p: &str) -> Url {
    Url::parse(&format!("https://public.example{}", p)).unwrap()
}

async fn serve_html(server: &MockServer, at: &str, body: &str, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8"))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_og_title_beats_html_title() {
    let server = MockServer::start().await;
    serve_html(
        &server,
        "/article",
        r#"<html><head>
            <title>HTML Title</title>
            <meta property="og:title" content="OG Title">
            <meta name="description" content="About things">
        </head><body></body></html>"#,
        1,
    )
    .await;

    let pipeline = pipeline_for(&server.uri(), |_| {});
    let result = pipeline.get_metadata(Some(&page("/article")), "").await;
    let tags = result.as_ref().expect("fetch failed").as_ref().expect("expected tags");
    assert_eq!(tags.title(), Some("OG Title"));
    assert_eq!(tags.get("description"), Some("About things"));

    let presentation = Presentation::resolve(&result, FALLBACK);
    assert_eq!(presentation.title, "OG Title");
}

#[tokio::test]
async fn test_html_title_only() {
    let server = MockServer::start().await;
    serve_html(
        &server,
        "/plain",
        "<html><head><title>HTML Title</title></head></html>",
        1,
    )
    .await;

    let pipeline = pipeline_for(&server.uri(), |_| {});
    let result = pipeline.get_metadata(Some(&page("/plain")), "").await;
    assert_eq!(Presentation::resolve(&result, FALLBACK).title, "HTML Title");
}

#[tokio::test]
async fn test_no_title_uses_fallback() {
    let server = MockServer::start().await;
    serve_html(&server, "/bare", "<html><body>hi</body></html>", 1).await;

    let pipeline = pipeline_for(&server.uri(), |_| {});
    let result = pipeline.get_metadata(Some(&page("/bare")), "").await;
    let tags = result.as_ref().unwrap().as_ref().expect("expected empty mapping");
    assert!(tags.is_empty());
    assert_eq!(Presentation::resolve(&result, FALLBACK).title, FALLBACK);
}

#[tokio::test]
async fn test_not_found_is_benign_and_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = pipeline_for(&server.uri(), |_| {});
    for _ in 0..3 {
        let result = pipeline.get_metadata(Some(&page("/gone")), "").await;
        assert!(matches!(result, Ok(None)));
        assert_eq!(Presentation::resolve(&result, FALLBACK).title, FALLBACK);
    }
}

#[tokio::test]
async fn test_non_html_is_benign() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(r#"{"ok":true}"#, "application/json"))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = pipeline_for(&server.uri(), |_| {});
    assert!(matches!(
        pipeline.get_metadata(Some(&page("/api")), "").await,
        Ok(None)
    ));
}

#[tokio::test]
async fn test_connection_refused_is_benign() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let pipeline = pipeline_for(&format!("http://127.0.0.1:{}", port), |_| {});
    let result = pipeline.get_metadata(Some(&page("/x")), "").await;
    assert!(matches!(result, Ok(None)));
    assert_eq!(Presentation::resolve(&result, FALLBACK).title, FALLBACK);
}

#[tokio::test]
async fn test_host_header_forwarded_and_keyed() {
    let server = MockServer::start().await;
    for (host, title) in [("a.example", "Site A"), ("b.example", "Site B")] {
        Mock::given(method("GET"))
            .and(path("/"))
            .and(header("host", host))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                format!(r#"<meta property="og:title" content="{}">"#, title),
                "text/html",
            ))
            .expect(1)
            .mount(&server)
            .await;
    }

    let pipeline = pipeline_for(&server.uri(), |c| c.consider_host = true);
    for _ in 0..2 {
        let a = pipeline.get_metadata(Some(&page("/")), "a.example").await;
        let b = pipeline.get_metadata(Some(&page("/")), "b.example").await;
        assert_eq!(a.unwrap().unwrap().title(), Some("Site A"));
        assert_eq!(b.unwrap().unwrap().title(), Some("Site B"));
    }
}

#[tokio::test]
async fn test_timeout_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<title>late</title>", "text/html")
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let pipeline = pipeline_for(&server.uri(), |c| c.timeout = Duration::from_millis(100));
    let result = pipeline.get_metadata(Some(&page("/slow")), "").await;
    assert!(matches!(result, Err(MetadataError::Timeout { .. })));
    assert_eq!(Presentation::resolve(&result, FALLBACK).title, FALLBACK);
}

#[tokio::test]
async fn test_concurrent_misses_fetch_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hot"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"<meta property="og:title" content="Hot">"#, "text/html")
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = pipeline_for(&server.uri(), |_| {});
    let url = page("/hot");
    let results = join_all((0..25).map(|_| pipeline.get_metadata(Some(&url), ""))).await;

    for result in results {
        assert_eq!(result.unwrap().unwrap().title(), Some("Hot"));
    }
}

#[tokio::test]
async fn test_body_truncated_at_limit() {
    let server = MockServer::start().await;
    let padding = "x".repeat(4096);
    let body = format!(
        r#"<html><head><meta property="og:site_name" content="Early"></head><body>{}<meta property="og:title" content="Too late"></body></html>"#,
        padding
    );
    serve_html(&server, "/big", &body, 1).await;

    let pipeline = pipeline_for(&server.uri(), |c| c.max_content_length = 1024);
    let tags = pipeline
        .get_metadata(Some(&page("/big")), "")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tags.get("og:site_name"), Some("Early"));
    assert!(!tags.contains("og:title"));
}

#[tokio::test]
async fn test_missing_url_rejected() {
    let pipeline = pipeline_for("http://127.0.0.1:9", |_| {});
    assert!(matches!(
        pipeline.get_metadata(None, "").await,
        Err(MetadataError::InvalidInput(_))
    ));
}
