//! Feed document types.

use chrono::{DateTime, Utc};

/// Syndication format of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    /// RSS 2.0 (and RSS 1.0/RDF, which is reported as RSS).
    Rss,
    /// Atom 1.0.
    Atom,
}

impl FeedKind {
    /// MIME type advertised for this kind in HTML `<link>` tags.
    pub fn mime_type(&self) -> &'static str {
        match self {
            FeedKind::Rss => "application/rss+xml",
            FeedKind::Atom => "application/atom+xml",
        }
    }

    /// Map an advertised MIME type back to a kind.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "application/rss+xml" => Some(FeedKind::Rss),
            "application/atom+xml" => Some(FeedKind::Atom),
            _ => None,
        }
    }
}

/// A single entry of a parsed feed.
///
/// Content is transient: items are rendered from the fetched payload and
/// never persisted. Only their identity reaches the read-state store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedItem {
    /// Item title. Empty when the feed omits it.
    pub title: String,
    /// Link to the article.
    pub link: Option<String>,
    /// Publisher-supplied identifier (`<guid>` or Atom `<id>`).
    pub guid: Option<String>,
    /// Author name.
    pub author: Option<String>,
    /// Publication time. Absent when missing or unparseable.
    pub published_at: Option<DateTime<Utc>>,
    /// Plain-text excerpt with markup stripped.
    pub content_snippet: Option<String>,
    /// Full content as supplied by the feed (usually HTML).
    pub content: Option<String>,
}

impl FeedItem {
    /// Create an item with the given title and nothing else.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Set the link.
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Set the guid.
    pub fn with_guid(mut self, guid: impl Into<String>) -> Self {
        self.guid = Some(guid.into());
        self
    }

    /// Set the author.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Set the publication time.
    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }
}

/// A parsed feed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFeed {
    /// Detected format.
    pub kind: FeedKind,
    /// Feed title. Empty when the feed omits it.
    pub title: String,
    /// Site URL (the website the feed belongs to).
    pub site_url: Option<String>,
    /// Feed description, markup stripped.
    pub description: Option<String>,
    /// Items in document order.
    pub items: Vec<FeedItem>,
}

/// A feed found while discovering feeds for a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFeed {
    /// Absolute feed URL.
    pub url: String,
    /// Title advertised by the page or the feed itself.
    pub title: Option<String>,
    /// Feed format.
    pub kind: FeedKind,
}
