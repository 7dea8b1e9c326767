//! Persistence for feeds, folders and per-user read state.
//!
//! The sync path talks to storage only through the [`ReadStateStore`] and
//! [`SyncLedger`] traits, so it can run against the SQL backend
//! ([`SqlStore`]) or the in-memory one ([`MemoryStore`]). Feed and folder
//! management uses the SQL repositories directly.
//!
//! Every operation is scoped by the caller's user ID.

mod feed_repository;
mod folder_repository;
mod memory;
mod sql;
mod types;

pub use feed_repository::FeedRepository;
pub use folder_repository::FolderRepository;
pub use memory::{FeedSyncState, MemoryStore};
pub use sql::SqlStore;
pub use types::{Feed, FeedWithUnread, Folder, InsertOutcome, NewFeed, TrackedArticle};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Result;

/// Per-user read state of feed items.
#[async_trait]
pub trait ReadStateStore: Send + Sync {
    /// All tracked articles of `feed_id` for `user_id`, in insertion order.
    async fn get_tracked(&self, feed_id: i64, user_id: &str) -> Result<Vec<TrackedArticle>>;

    /// Create an unread row for `guid` unless one already exists.
    ///
    /// Idempotent and safe under concurrent callers: a row that already
    /// exists (including one inserted by a racing caller) is returned as
    /// [`InsertOutcome::Existing`] and left untouched.
    async fn insert_if_absent(
        &self,
        feed_id: i64,
        user_id: &str,
        guid: &str,
    ) -> Result<InsertOutcome>;

    /// Mark an article read, setting `read_at` the first time only.
    ///
    /// Marking an already-read article is a no-op. Touching another
    /// user's article fails with `FeedsyncError::Unauthorized`.
    async fn mark_read(&self, article_id: i64, user_id: &str) -> Result<TrackedArticle>;

    /// Mark every unread article of a feed read. Returns how many changed.
    async fn mark_all_read(&self, feed_id: i64, user_id: &str) -> Result<u64>;

    /// Number of unread articles of a feed.
    async fn count_unread(&self, feed_id: i64, user_id: &str) -> Result<i64>;
}

/// Bookkeeping of sync attempts on the feed itself.
#[async_trait]
pub trait SyncLedger: Send + Sync {
    /// Record a successful sync: sets `last_synced_at` and clears errors.
    async fn record_sync_success(
        &self,
        feed_id: i64,
        user_id: &str,
        synced_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Record a failed sync attempt.
    async fn record_sync_failure(&self, feed_id: i64, user_id: &str, message: &str)
        -> Result<()>;
}
