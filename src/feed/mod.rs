//! Feed retrieval, parsing and discovery.
//!
//! - `fetcher`: HTTP retrieval with SSRF protection and size limits
//! - `parser`: RSS/Atom parsing into [`ParsedFeed`]
//! - `discovery`: finding feed URLs for a website
//! - `encoding`: character set detection for fetched bytes
//! - `identity`: the stable identity used to track an item's read state

pub mod discovery;
pub mod encoding;
pub mod fetcher;
pub mod identity;
pub mod parser;
pub mod types;

pub use discovery::{normalize_site_url, FeedDiscoverer};
pub use fetcher::{validate_url, FeedFetcher, FetchedBody};
pub use identity::{resolve_identity, resolve_identity_with_source, IdentitySource};
pub use parser::{parse_feed, FeedParser};
pub use types::{DiscoveredFeed, FeedItem, FeedKind, ParsedFeed};
