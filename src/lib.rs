//! feedsync - feed synchronization and read-state reconciliation
//!
//! Fetches RSS/Atom feeds, discovers feeds published by websites, and keeps
//! a per-user record of which feed items have been seen and read.

pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod logging;
pub mod store;
pub mod sync;
pub mod tracker;

pub use config::Config;
pub use db::Database;
pub use error::{
    DiscoveryError, FeedsyncError, FetchError, ParseError, Result, SyncError, SyncPhase,
};
pub use feed::{
    parse_feed, resolve_identity, DiscoveredFeed, FeedDiscoverer, FeedFetcher, FeedItem,
    FeedKind, FeedParser, ParsedFeed,
};
pub use store::{
    Feed, FeedWithUnread, Folder, MemoryStore, ReadStateStore, SqlStore, SyncLedger,
    TrackedArticle,
};
pub use sync::{
    AddFeedRequest, AnnotatedFeedItem, FeedService, ImportReport, SubscriptionImport,
    SyncOutcome, SyncReconciler,
};
pub use tracker::{spawn_read_marker, ItemPosition, ReadMarkerHandle, ViewportReadTracker};
