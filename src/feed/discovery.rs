//! Feed discovery for a website.
//!
//! Given a site URL (or a bare domain) the root page is fetched, a bounded
//! prefix of its HTML is scanned for `<link rel="alternate">` feed
//! declarations, and when none are declared a fixed list of well-known
//! paths is probed. Only failing to load the root page is an error; a site
//! without feeds yields an empty list.

use futures::future::join_all;
use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, FetchError};
use crate::feed::encoding::decode_html;
use crate::feed::fetcher::{FeedFetcher, FetchedBody};
use crate::feed::parser::FeedParser;
use crate::feed::types::{DiscoveredFeed, FeedKind};

/// Discovers feeds published by a website.
#[derive(Debug, Clone)]
pub struct FeedDiscoverer {
    fetcher: FeedFetcher,
    parser: FeedParser,
    max_page_bytes: u64,
    probe_paths: Vec<String>,
}

impl FeedDiscoverer {
    pub fn new(fetcher: FeedFetcher, parser: FeedParser, config: &DiscoveryConfig) -> Self {
        Self {
            fetcher,
            parser,
            max_page_bytes: config.max_page_bytes,
            probe_paths: config.probe_paths.clone(),
        }
    }

    /// Find the feeds offered by the site at `input`.
    ///
    /// Results declared by the page come first, in page order. Probe hits
    /// follow in probe order. Exact duplicate URLs are dropped.
    pub async fn discover(&self, input: &str) -> Result<Vec<DiscoveredFeed>, DiscoveryError> {
        let url = normalize_site_url(input);
        let page = self
            .fetcher
            .fetch_prefix(&url, self.max_page_bytes)
            .await
            .map_err(|source| DiscoveryError::RootPage {
                url: url.clone(),
                source,
            })?;

        if let Some(feed) = self.page_as_feed(&page).await {
            info!(url = %feed.url, "URL is itself a feed");
            return Ok(vec![feed]);
        }

        let base = Url::parse(&page.url).map_err(|e| DiscoveryError::RootPage {
            url: url.clone(),
            source: FetchError::InvalidUrl(e.to_string()),
        })?;

        let html = decode_html(&page.bytes, page.content_type.as_deref());
        let mut found = scan_link_tags(&html, &base);
        if found.is_empty() {
            debug!(url = %base, "no <link> feeds declared, probing well-known paths");
            found = self.probe(&base).await;
        }

        let found = dedupe(found);
        info!(url = %base, count = found.len(), "feed discovery finished");
        Ok(found)
    }

    /// Treat the page as a feed when it is not HTML and parses as one.
    ///
    /// A truncated page is only fetched again in full when it is served as
    /// a feed or XML type, or carries no type and starts like one.
    async fn page_as_feed(&self, page: &FetchedBody) -> Option<DiscoveredFeed> {
        let media_type = page.content_type.as_deref().map(media_type);
        if media_type.as_deref().is_some_and(|mt| mt.contains("html")) {
            return None;
        }

        let result = if !page.truncated {
            self.parser.parse(&page.bytes, page.content_type.as_deref())
        } else if looks_like_feed(media_type.as_deref(), &page.bytes) {
            let full = self.fetcher.fetch(&page.url).await.ok()?;
            self.parser.parse(&full.bytes, full.content_type.as_deref())
        } else {
            debug!(url = %page.url, "truncated page is not a feed");
            return None;
        };
        let parsed = result.ok()?;

        Some(DiscoveredFeed {
            url: page.url.clone(),
            title: non_empty(&parsed.title),
            kind: parsed.kind,
        })
    }

    async fn probe(&self, base: &Url) -> Vec<DiscoveredFeed> {
        let candidates: Vec<Url> = self
            .probe_paths
            .iter()
            .filter_map(|path| base.join(path).ok())
            .collect();

        // join_all keeps input order, so hits come back in probe order.
        join_all(candidates.iter().map(|candidate| self.probe_one(candidate)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn probe_one(&self, candidate: &Url) -> Option<DiscoveredFeed> {
        let body = match self.fetcher.fetch(candidate.as_str()).await {
            Ok(body) => body,
            Err(e) => {
                debug!(url = %candidate, error = %e, "probe missed");
                return None;
            }
        };

        match self.parser.parse(&body.bytes, body.content_type.as_deref()) {
            Ok(feed) => Some(DiscoveredFeed {
                url: body.url,
                title: non_empty(&feed.title),
                kind: feed.kind,
            }),
            Err(e) => {
                debug!(url = %candidate, error = %e, "probe returned a non-feed body");
                None
            }
        }
    }
}

/// Lowercased media type of a `Content-Type` value, without parameters.
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Whether a page could be a feed judging by its media type or, when the
/// server sent none, by how the body starts.
fn looks_like_feed(media_type: Option<&str>, prefix: &[u8]) -> bool {
    match media_type {
        Some(mt) => {
            FeedKind::from_mime_type(mt).is_some()
                || matches!(mt, "application/xml" | "text/xml")
                || mt.ends_with("+xml")
        }
        None => {
            let head = prefix.strip_prefix(b"\xef\xbb\xbf").unwrap_or(prefix);
            let start = head
                .iter()
                .position(|b| !b.is_ascii_whitespace())
                .unwrap_or(head.len());
            ["<?xml", "<rss", "<feed", "<rdf:RDF"]
                .iter()
                .any(|tag| head[start..].starts_with(tag.as_bytes()))
        }
    }
}

/// Turn user input into a fetchable URL. Bare domains get `https://`.
pub fn normalize_site_url(input: &str) -> String {
    let input = input.trim();
    if input.contains("://") {
        input.to_string()
    } else {
        format!("https://{}", input.trim_start_matches('/'))
    }
}

/// Collect `<link rel="alternate" type="application/{rss,atom}+xml">` tags.
///
/// `href`s are resolved against `base`; links that do not resolve to an
/// http(s) URL are skipped.
pub fn scan_link_tags(html: &str, base: &Url) -> Vec<DiscoveredFeed> {
    let Ok(selector) = Selector::parse("link[href]") else {
        return Vec::new();
    };
    let document = Html::parse_document(html);

    document
        .select(&selector)
        .filter_map(|element| {
            let attrs = element.value();
            let is_alternate = attrs.attr("rel").is_some_and(|rel| {
                rel.split_ascii_whitespace()
                    .any(|token| token.eq_ignore_ascii_case("alternate"))
            });
            if !is_alternate {
                return None;
            }

            let kind = FeedKind::from_mime_type(attrs.attr("type")?)?;
            let url = base.join(attrs.attr("href")?.trim()).ok()?;
            if !matches!(url.scheme(), "http" | "https") {
                return None;
            }

            Some(DiscoveredFeed {
                url: url.to_string(),
                title: attrs.attr("title").and_then(non_empty),
                kind,
            })
        })
        .collect()
}

fn dedupe(feeds: Vec<DiscoveredFeed>) -> Vec<DiscoveredFeed> {
    let mut seen = std::collections::HashSet::new();
    feeds
        .into_iter()
        .filter(|feed| seen.insert(feed.url.clone()))
        .collect()
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}
