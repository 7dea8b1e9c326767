//! Persistent types: feeds, folders and tracked articles.

use chrono::{DateTime, Utc};

/// A feed subscription owned by one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    /// Feed ID.
    pub id: i64,
    /// Owning user.
    pub user_id: String,
    /// Feed URL.
    pub url: String,
    /// Display title.
    pub title: String,
    /// Site URL (the website the feed belongs to).
    pub site_url: Option<String>,
    /// Folder the feed is filed under, if any.
    pub folder_id: Option<i64>,
    /// Last successful sync.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Number of consecutive failed syncs.
    pub error_count: i32,
    /// Last sync error message.
    pub last_error: Option<String>,
    /// When the subscription was created.
    pub created_at: DateTime<Utc>,
}

/// New feed for creation.
#[derive(Debug, Clone)]
pub struct NewFeed {
    pub user_id: String,
    pub url: String,
    pub title: String,
    pub site_url: Option<String>,
    pub folder_id: Option<i64>,
}

impl NewFeed {
    /// Create a new feed.
    pub fn new(user_id: impl Into<String>, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            url: url.into(),
            title: title.into(),
            site_url: None,
            folder_id: None,
        }
    }

    /// Set the site URL.
    pub fn with_site_url(mut self, site_url: impl Into<String>) -> Self {
        self.site_url = Some(site_url.into());
        self
    }

    /// File the feed under a folder.
    pub fn with_folder(mut self, folder_id: i64) -> Self {
        self.folder_id = Some(folder_id);
        self
    }
}

/// A feed together with its unread count for the owning user.
#[derive(Debug, Clone)]
pub struct FeedWithUnread {
    pub feed: Feed,
    pub unread_count: i64,
}

/// A user-defined grouping of feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Read state of one feed item for one user.
///
/// Rows are created on first sight and never deleted by sync. `is_read`
/// only ever moves from false to true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedArticle {
    pub id: i64,
    pub feed_id: i64,
    pub user_id: String,
    /// Item identity (see [`crate::feed::resolve_identity`]).
    pub guid: String,
    pub is_read: bool,
    /// Set exactly once, when the article is first marked read.
    pub read_at: Option<DateTime<Utc>>,
    pub first_seen_at: DateTime<Utc>,
}

/// Result of [`ReadStateStore::insert_if_absent`](crate::store::ReadStateStore::insert_if_absent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was created.
    Inserted(TrackedArticle),
    /// The row already existed and was left untouched.
    Existing(TrackedArticle),
}

impl InsertOutcome {
    pub fn was_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted(_))
    }

    pub fn article(&self) -> &TrackedArticle {
        match self {
            InsertOutcome::Inserted(a) | InsertOutcome::Existing(a) => a,
        }
    }

    pub fn into_article(self) -> TrackedArticle {
        match self {
            InsertOutcome::Inserted(a) | InsertOutcome::Existing(a) => a,
        }
    }
}
