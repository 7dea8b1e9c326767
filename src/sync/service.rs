//! Feed service.
//!
//! High level feed operations as invoked by in-app actions: subscribing,
//! organizing feeds into folders, syncing and marking articles read. Every
//! operation is scoped to the calling user; touching another user's feed or
//! folder is refused with [`FeedsyncError::Unauthorized`].

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::error::{FeedsyncError, Result};
use crate::feed::{
    normalize_site_url, validate_url, DiscoveredFeed, FeedDiscoverer, FeedFetcher, FeedParser,
    ParsedFeed,
};
use crate::store::{
    Feed, FeedRepository, FeedWithUnread, Folder, FolderRepository, NewFeed, SqlStore,
    TrackedArticle,
};
use crate::sync::reconciler::{SyncOutcome, SyncReconciler};

/// Request to subscribe to a feed.
#[derive(Debug, Clone)]
pub struct AddFeedRequest {
    /// Subscribing user.
    pub user_id: String,
    /// Feed URL, or a site URL / bare domain to discover a feed from.
    pub url: String,
    /// Custom title (optional, taken from the feed if not provided).
    pub title: Option<String>,
    /// Folder to file the feed under.
    pub folder_id: Option<i64>,
}

impl AddFeedRequest {
    pub fn new(user_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            url: url.into(),
            title: None,
            folder_id: None,
        }
    }

    /// Set a custom title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// File the new feed under a folder.
    pub fn with_folder(mut self, folder_id: i64) -> Self {
        self.folder_id = Some(folder_id);
        self
    }
}

/// One subscription from an external import (such as an OPML file).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionImport {
    pub feed_url: String,
    pub title: Option<String>,
    /// Folder name; created on demand.
    pub folder_name: Option<String>,
}

impl SubscriptionImport {
    pub fn new(feed_url: impl Into<String>) -> Self {
        Self {
            feed_url: feed_url.into(),
            title: None,
            folder_name: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn in_folder(mut self, folder_name: impl Into<String>) -> Self {
        self.folder_name = Some(folder_name.into());
        self
    }
}

/// Why an imported subscription was not created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The URL appeared earlier in the same import.
    Duplicate,
    /// The user is already subscribed to the URL.
    AlreadySubscribed,
    /// The URL is not a fetchable http(s) URL.
    InvalidUrl,
}

/// An imported subscription that was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedImport {
    pub url: String,
    pub reason: SkipReason,
}

/// Result of [`FeedService::import_subscriptions`].
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub created: Vec<Feed>,
    pub skipped: Vec<SkippedImport>,
}

/// Outcome of syncing one feed during [`FeedService::refresh_all`].
#[derive(Debug)]
pub struct FeedRefresh {
    pub feed_id: i64,
    pub result: Result<SyncOutcome>,
}

/// Service for feed operations.
#[derive(Debug, Clone)]
pub struct FeedService {
    db: Database,
    fetcher: FeedFetcher,
    parser: FeedParser,
    discoverer: FeedDiscoverer,
    reconciler: SyncReconciler,
    allow_private_hosts: bool,
}

impl FeedService {
    /// Create a service over `db`, backed by the SQL read-state store.
    pub fn new(db: Database, config: &Config) -> Result<Self> {
        let fetcher = FeedFetcher::new(&config.fetch)?;
        let parser = FeedParser::new(config.fetch.max_content_length);
        let discoverer = FeedDiscoverer::new(fetcher.clone(), parser, &config.discovery);
        let store = Arc::new(SqlStore::new(db.pool().clone()));
        let reconciler = SyncReconciler::new(
            fetcher.clone(),
            parser,
            store.clone(),
            store,
            config.sync.clone(),
        );

        Ok(Self {
            db,
            fetcher,
            parser,
            discoverer,
            reconciler,
            allow_private_hosts: config.fetch.allow_private_hosts,
        })
    }

    /// Find the feeds offered by a website.
    pub async fn discover(&self, site: &str) -> Result<Vec<DiscoveredFeed>> {
        Ok(self.discoverer.discover(site).await?)
    }

    /// Subscribe a user to a feed.
    ///
    /// `request.url` may point at the feed itself or at a website, in which
    /// case the first discovered feed is used.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The URL is empty, or no feed can be found there
    /// - The user is already subscribed to the feed
    /// - The folder does not belong to the user
    /// - The feed cannot be fetched or parsed
    pub async fn add_feed(&self, request: &AddFeedRequest) -> Result<Feed> {
        let input = request.url.trim();
        if input.is_empty() {
            return Err(FeedsyncError::Validation("feed URL is empty".to_string()));
        }
        if let Some(folder_id) = request.folder_id {
            self.owned_folder(folder_id, &request.user_id).await?;
        }

        let url = normalize_site_url(input);
        self.ensure_not_subscribed(&request.user_id, &url).await?;

        let (url, parsed) = match self.fetch_parsed(&url).await {
            Ok(parsed) => (url, parsed),
            Err(FeedsyncError::Fetch(e)) => return Err(FeedsyncError::Fetch(e)),
            Err(_) => {
                debug!(url = %url, "not a feed, running discovery");
                let found = self.discoverer.discover(&url).await?;
                let first = found.into_iter().next().ok_or_else(|| {
                    FeedsyncError::Validation(format!("no feed found at {}", url))
                })?;
                self.ensure_not_subscribed(&request.user_id, &first.url)
                    .await?;
                let parsed = self.fetch_parsed(&first.url).await?;
                (first.url, parsed)
            }
        };

        let title = request
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .or_else(|| Some(parsed.title.trim().to_string()).filter(|t| !t.is_empty()))
            .unwrap_or_else(|| url.clone());

        let mut new_feed = NewFeed::new(&request.user_id, &url, title);
        if let Some(site_url) = parsed.site_url {
            new_feed = new_feed.with_site_url(site_url);
        }
        if let Some(folder_id) = request.folder_id {
            new_feed = new_feed.with_folder(folder_id);
        }

        let feed = FeedRepository::new(self.db.pool()).create(&new_feed).await?;
        info!(feed_id = feed.id, url = %feed.url, user = %feed.user_id, "feed added");
        Ok(feed)
    }

    /// Get one of the user's feeds.
    pub async fn get_feed(&self, feed_id: i64, user_id: &str) -> Result<Feed> {
        self.owned_feed(feed_id, user_id).await
    }

    /// List the user's feeds with unread counts.
    pub async fn list_feeds(&self, user_id: &str) -> Result<Vec<FeedWithUnread>> {
        FeedRepository::new(self.db.pool())
            .list_with_unread(user_id)
            .await
    }

    /// Rename a feed.
    pub async fn rename_feed(&self, feed_id: i64, user_id: &str, title: &str) -> Result<Feed> {
        let title = title.trim();
        if title.is_empty() {
            return Err(FeedsyncError::Validation("feed title is empty".to_string()));
        }
        self.owned_feed(feed_id, user_id).await?;

        FeedRepository::new(self.db.pool())
            .update_title(feed_id, title)
            .await?;
        self.owned_feed(feed_id, user_id).await
    }

    /// File a feed under a folder, or under no folder with `None`.
    pub async fn move_feed(
        &self,
        feed_id: i64,
        user_id: &str,
        folder_id: Option<i64>,
    ) -> Result<Feed> {
        self.owned_feed(feed_id, user_id).await?;
        if let Some(folder_id) = folder_id {
            self.owned_folder(folder_id, user_id).await?;
        }

        FeedRepository::new(self.db.pool())
            .set_folder(feed_id, folder_id)
            .await?;
        self.owned_feed(feed_id, user_id).await
    }

    /// Unsubscribe. The feed's tracked articles are deleted with it.
    pub async fn delete_feed(&self, feed_id: i64, user_id: &str) -> Result<()> {
        self.owned_feed(feed_id, user_id).await?;
        FeedRepository::new(self.db.pool()).delete(feed_id).await?;
        info!(feed_id, user = %user_id, "feed deleted");
        Ok(())
    }

    /// Create a folder.
    pub async fn create_folder(&self, user_id: &str, name: &str) -> Result<Folder> {
        let name = validate_folder_name(name)?;
        let repo = FolderRepository::new(self.db.pool());
        if repo.get_by_name(user_id, name).await?.is_some() {
            return Err(FeedsyncError::Validation(format!(
                "folder '{}' already exists",
                name
            )));
        }
        repo.create(user_id, name).await
    }

    /// List the user's folders by name.
    pub async fn list_folders(&self, user_id: &str) -> Result<Vec<Folder>> {
        FolderRepository::new(self.db.pool())
            .list_by_user(user_id)
            .await
    }

    /// Rename a folder.
    pub async fn rename_folder(&self, folder_id: i64, user_id: &str, name: &str) -> Result<Folder> {
        let name = validate_folder_name(name)?;
        let folder = self.owned_folder(folder_id, user_id).await?;
        if folder.name == name {
            return Ok(folder);
        }

        let repo = FolderRepository::new(self.db.pool());
        if repo.get_by_name(user_id, name).await?.is_some() {
            return Err(FeedsyncError::Validation(format!(
                "folder '{}' already exists",
                name
            )));
        }
        repo.rename(folder_id, name).await?;
        self.owned_folder(folder_id, user_id).await
    }

    /// Delete a folder. Its feeds are kept, outside any folder.
    pub async fn delete_folder(&self, folder_id: i64, user_id: &str) -> Result<()> {
        self.owned_folder(folder_id, user_id).await?;
        FolderRepository::new(self.db.pool())
            .delete(folder_id)
            .await?;
        Ok(())
    }

    /// Sync one feed and return its items annotated with read state.
    pub async fn sync_feed(&self, feed_id: i64, user_id: &str) -> Result<SyncOutcome> {
        let feed = self.owned_feed(feed_id, user_id).await?;
        self.reconciler.sync(&feed, user_id).await
    }

    /// Sync all of the user's feeds concurrently.
    ///
    /// Each feed is synced independently; one failure does not affect the
    /// others. Results are in feed order.
    pub async fn refresh_all(&self, user_id: &str) -> Result<Vec<FeedRefresh>> {
        let feeds = FeedRepository::new(self.db.pool())
            .list_by_user(user_id)
            .await?;
        info!(user = %user_id, count = feeds.len(), "refreshing feeds");

        let syncs = feeds.iter().map(|feed| async move {
            FeedRefresh {
                feed_id: feed.id,
                result: self.reconciler.sync(feed, user_id).await,
            }
        });
        Ok(join_all(syncs).await)
    }

    /// Mark a tracked article read.
    pub async fn mark_read(&self, article_id: i64, user_id: &str) -> Result<TrackedArticle> {
        self.reconciler.store().mark_read(article_id, user_id).await
    }

    /// Mark every article of a feed read. Returns how many changed.
    pub async fn mark_all_read(&self, feed_id: i64, user_id: &str) -> Result<u64> {
        self.owned_feed(feed_id, user_id).await?;
        self.reconciler
            .store()
            .mark_all_read(feed_id, user_id)
            .await
    }

    /// Create subscriptions from an external list.
    ///
    /// Entries are not fetched; the next sync validates them. Folders are
    /// created by name as needed. Invalid URLs, repeats within the batch and
    /// existing subscriptions are skipped and reported.
    pub async fn import_subscriptions(
        &self,
        user_id: &str,
        imports: Vec<SubscriptionImport>,
    ) -> Result<ImportReport> {
        let feeds = FeedRepository::new(self.db.pool());
        let folders = FolderRepository::new(self.db.pool());
        let mut seen = HashSet::new();
        let mut report = ImportReport::default();

        for import in imports {
            let url = import.feed_url.trim().to_string();
            let skip = |reason| SkippedImport {
                url: url.clone(),
                reason,
            };

            if validate_url(&url, self.allow_private_hosts).is_err() {
                report.skipped.push(skip(SkipReason::InvalidUrl));
                continue;
            }
            if !seen.insert(url.clone()) {
                report.skipped.push(skip(SkipReason::Duplicate));
                continue;
            }
            if feeds.get_by_user_url(user_id, &url).await?.is_some() {
                report.skipped.push(skip(SkipReason::AlreadySubscribed));
                continue;
            }

            let folder_id = match import
                .folder_name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
            {
                Some(name) => match folders.get_by_name(user_id, name).await? {
                    Some(folder) => Some(folder.id),
                    None => Some(folders.create(user_id, name).await?.id),
                },
                None => None,
            };

            let title = import
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(&url)
                .to_string();
            let mut new_feed = NewFeed::new(user_id, &url, title);
            if let Some(folder_id) = folder_id {
                new_feed = new_feed.with_folder(folder_id);
            }
            report.created.push(feeds.create(&new_feed).await?);
        }

        info!(
            user = %user_id,
            created = report.created.len(),
            skipped = report.skipped.len(),
            "subscriptions imported"
        );
        Ok(report)
    }

    async fn fetch_parsed(&self, url: &str) -> Result<ParsedFeed> {
        let body = self.fetcher.fetch(url).await?;
        Ok(self
            .parser
            .parse(&body.bytes, body.content_type.as_deref())?)
    }

    async fn ensure_not_subscribed(&self, user_id: &str, url: &str) -> Result<()> {
        let existing = FeedRepository::new(self.db.pool())
            .get_by_user_url(user_id, url)
            .await?;
        if existing.is_some() {
            return Err(FeedsyncError::Validation(format!(
                "already subscribed to {}",
                url
            )));
        }
        Ok(())
    }

    async fn owned_feed(&self, feed_id: i64, user_id: &str) -> Result<Feed> {
        let feed = FeedRepository::new(self.db.pool())
            .get_by_id(feed_id)
            .await?
            .ok_or_else(|| FeedsyncError::NotFound("feed".to_string()))?;
        if feed.user_id != user_id {
            error!(feed_id, owner = %feed.user_id, caller = %user_id, "feed access refused");
            return Err(FeedsyncError::Unauthorized(format!(
                "feed {} belongs to another user",
                feed_id
            )));
        }
        Ok(feed)
    }

    async fn owned_folder(&self, folder_id: i64, user_id: &str) -> Result<Folder> {
        let folder = FolderRepository::new(self.db.pool())
            .get_by_id(folder_id)
            .await?
            .ok_or_else(|| FeedsyncError::NotFound("folder".to_string()))?;
        if folder.user_id != user_id {
            warn!(folder_id, owner = %folder.user_id, caller = %user_id, "folder access refused");
            return Err(FeedsyncError::Unauthorized(format!(
                "folder {} belongs to another user",
                folder_id
            )));
        }
        Ok(folder)
    }
}

fn validate_folder_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(FeedsyncError::Validation("folder name is empty".to_string()));
    }
    Ok(name)
}
