//! Test helpers for integration tests.
//!
//! Provides a mock feed server, feed document builders and a service over
//! an in-memory database.

#![allow(dead_code)]

use feedsync::config::Config;
use feedsync::{Database, FeedService};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const RSS_TYPE: &str = "application/rss+xml";
pub const ATOM_TYPE: &str = "application/atom+xml";
pub const HTML_TYPE: &str = "text/html; charset=utf-8";

/// Configuration for tests: local hosts allowed, short timeouts, fast retry.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.fetch.allow_private_hosts = true;
    config.fetch.connect_timeout_secs = 2;
    config.fetch.read_timeout_secs = 2;
    config.fetch.total_timeout_secs = 2;
    config.sync.retry_backoff_ms = 10;
    config
}

/// Feed service over a fresh in-memory database.
#[cfg(feature = "sqlite")]
pub async fn test_service() -> (FeedService, Database) {
    let db = Database::open_in_memory().await.unwrap();
    let service = FeedService::new(db.clone(), &test_config()).unwrap();
    (service, db)
}

/// RSS 2.0 document with one item per guid.
pub fn rss_with_guids(guids: &[&str]) -> String {
    let items: String = guids
        .iter()
        .map(|guid| {
            format!(
                r#"
        <item>
            <title>Post {guid}</title>
            <link>https://example.com/posts/{guid}</link>
            <guid isPermaLink="false">{guid}</guid>
            <description>&lt;p&gt;Body of {guid}&lt;/p&gt;</description>
            <pubDate>Mon, 06 Jan 2025 10:00:00 GMT</pubDate>
        </item>"#
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
    <channel>
        <title>Example Blog</title>
        <link>https://example.com/</link>
        <description>Posts</description>{items}
    </channel>
</rss>"#
    )
}

/// Minimal Atom document with one entry.
pub fn atom_feed(title: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
    <title>{title}</title>
    <link rel="alternate" href="https://example.com/"/>
    <id>urn:example:feed</id>
    <updated>2025-01-06T10:00:00Z</updated>
    <entry>
        <title>Entry</title>
        <id>urn:example:entry:1</id>
        <link rel="alternate" href="https://example.com/entry/1"/>
        <updated>2025-01-06T10:00:00Z</updated>
    </entry>
</feed>"#
    )
}

/// HTML page with the given `<head>` content.
pub fn html_page(head: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>Example</title>{head}</head><body><p>Hello</p></body></html>"
    )
}

/// Serve `body` at `route` with a content type, replacing nothing else.
pub async fn mount(server: &MockServer, route: &str, content_type: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", content_type)
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

/// Serve an RSS feed with `guids` at `/feed.xml`, replacing all mocks.
pub async fn serve_feed(server: &MockServer, guids: &[&str]) {
    server.reset().await;
    mount(server, "/feed.xml", RSS_TYPE, rss_with_guids(guids)).await;
}
