//! In-memory read-state store for tests and offline use.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::error;

use super::types::{InsertOutcome, TrackedArticle};
use super::{ReadStateStore, SyncLedger};
use crate::{FeedsyncError, Result};

/// Sync bookkeeping kept for a feed by [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedSyncState {
    pub last_synced_at: Option<DateTime<Utc>>,
    pub error_count: i32,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    articles: HashMap<i64, TrackedArticle>,
    by_key: HashMap<(i64, String, String), i64>,
    feeds: HashMap<i64, FeedSyncState>,
}

/// Read-state store kept in process memory.
///
/// Every operation runs under one lock, so `insert_if_absent` is atomic
/// just like the SQL upsert.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of tracked articles across all feeds and users.
    pub async fn len(&self) -> usize {
        self.state.read().await.articles.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Sync bookkeeping recorded for a feed, if any.
    pub async fn sync_state(&self, feed_id: i64) -> Option<FeedSyncState> {
        self.state.read().await.feeds.get(&feed_id).cloned()
    }
}

#[async_trait]
impl ReadStateStore for MemoryStore {
    async fn get_tracked(&self, feed_id: i64, user_id: &str) -> Result<Vec<TrackedArticle>> {
        let state = self.state.read().await;
        let mut tracked: Vec<TrackedArticle> = state
            .articles
            .values()
            .filter(|a| a.feed_id == feed_id && a.user_id == user_id)
            .cloned()
            .collect();
        tracked.sort_by_key(|a| a.id);
        Ok(tracked)
    }

    async fn insert_if_absent(
        &self,
        feed_id: i64,
        user_id: &str,
        guid: &str,
    ) -> Result<InsertOutcome> {
        let mut state = self.state.write().await;
        let key = (feed_id, user_id.to_string(), guid.to_string());

        if let Some(existing) = state.by_key.get(&key).and_then(|id| state.articles.get(id)) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }

        state.next_id += 1;
        let article = TrackedArticle {
            id: state.next_id,
            feed_id,
            user_id: user_id.to_string(),
            guid: guid.to_string(),
            is_read: false,
            read_at: None,
            first_seen_at: Utc::now(),
        };
        state.by_key.insert(key, article.id);
        state.articles.insert(article.id, article.clone());
        Ok(InsertOutcome::Inserted(article))
    }

    async fn mark_read(&self, article_id: i64, user_id: &str) -> Result<TrackedArticle> {
        let mut state = self.state.write().await;
        let article = state
            .articles
            .get_mut(&article_id)
            .ok_or_else(|| FeedsyncError::NotFound("tracked article".into()))?;

        if article.user_id != user_id {
            error!(
                article_id,
                owner = %article.user_id,
                caller = %user_id,
                "refusing to mark another user's article read"
            );
            return Err(FeedsyncError::Unauthorized(format!(
                "tracked article {article_id} belongs to another user"
            )));
        }

        if !article.is_read {
            article.is_read = true;
            article.read_at = Some(Utc::now());
        }
        Ok(article.clone())
    }

    async fn mark_all_read(&self, feed_id: i64, user_id: &str) -> Result<u64> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut changed = 0;
        for article in state
            .articles
            .values_mut()
            .filter(|a| a.feed_id == feed_id && a.user_id == user_id && !a.is_read)
        {
            article.is_read = true;
            article.read_at = Some(now);
            changed += 1;
        }
        Ok(changed)
    }

    async fn count_unread(&self, feed_id: i64, user_id: &str) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state
            .articles
            .values()
            .filter(|a| a.feed_id == feed_id && a.user_id == user_id && !a.is_read)
            .count() as i64)
    }
}

#[async_trait]
impl SyncLedger for MemoryStore {
    async fn record_sync_success(
        &self,
        feed_id: i64,
        _user_id: &str,
        synced_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state.feeds.entry(feed_id).or_default();
        entry.last_synced_at = Some(synced_at);
        entry.error_count = 0;
        entry.last_error = None;
        Ok(())
    }

    async fn record_sync_failure(
        &self,
        feed_id: i64,
        _user_id: &str,
        message: &str,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state.feeds.entry(feed_id).or_default();
        entry.error_count += 1;
        entry.last_error = Some(message.to_string());
        Ok(())
    }
}
