//! Reconciles a live feed document against a user's read state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::{FeedsyncError, Result, SyncError};
use crate::feed::{resolve_identity, FeedFetcher, FeedItem, FeedParser, ParsedFeed};
use crate::store::{Feed, InsertOutcome, ReadStateStore, SyncLedger};

/// A parsed item joined with the reader's read state.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedFeedItem {
    pub item: FeedItem,
    /// Resolved identity, matching `TrackedArticle::guid`.
    pub identity: String,
    pub tracked_article_id: i64,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    /// Whether this sync created the tracking row.
    pub is_new: bool,
}

/// Result of a successful sync.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub feed_id: i64,
    /// Every resolvable item, in document order.
    pub items: Vec<AnnotatedFeedItem>,
    /// Number of tracking rows created by this sync.
    pub new_count: usize,
    pub synced_at: DateTime<Utc>,
}

/// Fetches, parses and reconciles one feed for one user.
///
/// Holds no per-feed state, so independent syncs may run concurrently; the
/// store's idempotent insert is the only coordination point.
#[derive(Clone)]
pub struct SyncReconciler {
    fetcher: FeedFetcher,
    parser: FeedParser,
    store: Arc<dyn ReadStateStore>,
    ledger: Arc<dyn SyncLedger>,
    config: SyncConfig,
}

impl SyncReconciler {
    pub fn new(
        fetcher: FeedFetcher,
        parser: FeedParser,
        store: Arc<dyn ReadStateStore>,
        ledger: Arc<dyn SyncLedger>,
        config: SyncConfig,
    ) -> Self {
        Self {
            fetcher,
            parser,
            store,
            ledger,
            config,
        }
    }

    /// The read-state store this reconciler writes to.
    pub fn store(&self) -> &Arc<dyn ReadStateStore> {
        &self.store
    }

    /// Sync `feed` for `user_id`.
    ///
    /// A fetch or parse failure is recorded on the feed and returned as
    /// [`FeedsyncError::Sync`]; tracked articles are not touched in that
    /// case.
    pub async fn sync(&self, feed: &Feed, user_id: &str) -> Result<SyncOutcome> {
        if feed.user_id != user_id {
            error!(
                feed_id = feed.id,
                owner = %feed.user_id,
                caller = %user_id,
                "refusing to sync another user's feed"
            );
            return Err(FeedsyncError::Unauthorized(format!(
                "feed {} belongs to another user",
                feed.id
            )));
        }

        debug!(feed_id = feed.id, url = %feed.url, "syncing feed");

        let parsed = match self.fetch_and_parse(feed).await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(feed_id = feed.id, phase = %e.phase(), error = %e, "sync failed");
                if let Err(err) = self
                    .ledger
                    .record_sync_failure(feed.id, user_id, &e.to_string())
                    .await
                {
                    warn!(feed_id = feed.id, error = %err, "failed to record sync failure");
                }
                return Err(e.into());
            }
        };

        let (items, new_count) = self.reconcile(feed, user_id, parsed.items).await?;

        let synced_at = Utc::now();
        self.ledger
            .record_sync_success(feed.id, user_id, synced_at)
            .await?;

        if new_count > 0 {
            info!(feed_id = feed.id, new_count, "feed synced");
        } else {
            debug!(feed_id = feed.id, "feed synced: no new items");
        }

        Ok(SyncOutcome {
            feed_id: feed.id,
            items,
            new_count,
            synced_at,
        })
    }

    /// Join `items` with the stored read state, creating unread rows for
    /// identities not seen before.
    ///
    /// Items without a resolvable identity are dropped. An identity that
    /// appears twice in `items` maps to the same row and counts once.
    pub async fn reconcile(
        &self,
        feed: &Feed,
        user_id: &str,
        items: Vec<FeedItem>,
    ) -> Result<(Vec<AnnotatedFeedItem>, usize)> {
        let resolved: Vec<(String, FeedItem)> = items
            .into_iter()
            .filter_map(|item| match resolve_identity(&item) {
                Some(identity) => Some((identity, item)),
                None => {
                    debug!(feed_id = feed.id, "dropping item without identity");
                    None
                }
            })
            .collect();

        let mut known: HashMap<String, (i64, bool, Option<DateTime<Utc>>, bool)> = self
            .store
            .get_tracked(feed.id, user_id)
            .await?
            .into_iter()
            .map(|a| (a.guid, (a.id, a.is_read, a.read_at, false)))
            .collect();

        let mut new_count = 0;
        for (identity, _) in &resolved {
            if known.contains_key(identity) {
                continue;
            }
            // Rows inserted by a racing sync come back as Existing.
            let (article, inserted) = match self
                .store
                .insert_if_absent(feed.id, user_id, identity)
                .await?
            {
                InsertOutcome::Inserted(article) => (article, true),
                InsertOutcome::Existing(article) => (article, false),
            };
            if inserted {
                new_count += 1;
            }
            known.insert(
                identity.clone(),
                (article.id, article.is_read, article.read_at, inserted),
            );
        }

        let annotated = resolved
            .into_iter()
            .filter_map(|(identity, item)| {
                let (id, is_read, read_at, is_new) = *known.get(&identity)?;
                Some(AnnotatedFeedItem {
                    item,
                    identity,
                    tracked_article_id: id,
                    is_read,
                    read_at,
                    is_new,
                })
            })
            .collect();

        Ok((annotated, new_count))
    }

    async fn fetch_and_parse(&self, feed: &Feed) -> std::result::Result<ParsedFeed, SyncError> {
        let body = match self.fetcher.fetch(&feed.url).await {
            Ok(body) => body,
            Err(e) if self.config.retry_transient && e.is_transient() => {
                debug!(feed_id = feed.id, error = %e, "transient fetch failure, retrying");
                tokio::time::sleep(Duration::from_millis(self.config.retry_backoff_ms)).await;
                self.fetcher.fetch(&feed.url).await?
            }
            Err(e) => return Err(e.into()),
        };

        Ok(self
            .parser
            .parse(&body.bytes, body.content_type.as_deref())?)
    }
}

impl std::fmt::Debug for SyncReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncReconciler")
            .field("parser", &self.parser)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
