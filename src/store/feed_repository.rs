//! Feed repository.

use chrono::{DateTime, Utc};

use super::types::{Feed, FeedWithUnread, NewFeed};
use crate::db::{parse_datetime, DbPool};
use crate::{FeedsyncError, Result};

const FEED_COLUMNS: &str = "id, user_id, url, title, site_url, folder_id, last_synced_at, \
                            error_count, last_error, created_at";

/// Row type for a feed.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FeedRow {
    id: i64,
    user_id: String,
    url: String,
    title: String,
    site_url: Option<String>,
    folder_id: Option<i64>,
    last_synced_at: Option<String>,
    error_count: i32,
    last_error: Option<String>,
    created_at: String,
}

impl From<FeedRow> for Feed {
    fn from(row: FeedRow) -> Self {
        Feed {
            id: row.id,
            user_id: row.user_id,
            url: row.url,
            title: row.title,
            site_url: row.site_url,
            folder_id: row.folder_id,
            last_synced_at: row.last_synced_at.and_then(|s| parse_datetime(&s)),
            error_count: row.error_count,
            last_error: row.last_error,
            created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Row type for a feed with its unread count.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FeedWithUnreadRow {
    #[sqlx(flatten)]
    feed: FeedRow,
    unread_count: i64,
}

/// Repository for feed operations.
pub struct FeedRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FeedRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new feed.
    pub async fn create(&self, feed: &NewFeed) -> Result<Feed> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO feeds (user_id, url, title, site_url, folder_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&feed.user_id)
        .bind(&feed.url)
        .bind(&feed.title)
        .bind(&feed.site_url)
        .bind(feed.folder_id)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(self.pool)
        .await
        .map_err(|e| FeedsyncError::Database(e.to_string()))?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| FeedsyncError::NotFound("feed".into()))
    }

    /// Get a feed by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Feed>> {
        let query = format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = $1");
        let row = sqlx::query_as::<_, FeedRow>(&query)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| FeedsyncError::Database(e.to_string()))?;

        Ok(row.map(Feed::from))
    }

    /// Get a user's subscription to a URL.
    pub async fn get_by_user_url(&self, user_id: &str, url: &str) -> Result<Option<Feed>> {
        let query = format!("SELECT {FEED_COLUMNS} FROM feeds WHERE user_id = $1 AND url = $2");
        let row = sqlx::query_as::<_, FeedRow>(&query)
            .bind(user_id)
            .bind(url)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| FeedsyncError::Database(e.to_string()))?;

        Ok(row.map(Feed::from))
    }

    /// List a user's feeds in creation order.
    pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<Feed>> {
        let query = format!("SELECT {FEED_COLUMNS} FROM feeds WHERE user_id = $1 ORDER BY id ASC");
        let rows = sqlx::query_as::<_, FeedRow>(&query)
            .bind(user_id)
            .fetch_all(self.pool)
            .await
            .map_err(|e| FeedsyncError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Feed::from).collect())
    }

    /// List the feeds filed under a folder.
    pub async fn list_by_folder(&self, folder_id: i64) -> Result<Vec<Feed>> {
        let query =
            format!("SELECT {FEED_COLUMNS} FROM feeds WHERE folder_id = $1 ORDER BY id ASC");
        let rows = sqlx::query_as::<_, FeedRow>(&query)
            .bind(folder_id)
            .fetch_all(self.pool)
            .await
            .map_err(|e| FeedsyncError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Feed::from).collect())
    }

    /// List a user's feeds with their unread article counts.
    pub async fn list_with_unread(&self, user_id: &str) -> Result<Vec<FeedWithUnread>> {
        let rows = sqlx::query_as::<_, FeedWithUnreadRow>(
            r#"
            SELECT f.id, f.user_id, f.url, f.title, f.site_url, f.folder_id, f.last_synced_at,
                   f.error_count, f.last_error, f.created_at,
                   (SELECT COUNT(*) FROM tracked_articles t
                    WHERE t.feed_id = f.id AND t.user_id = f.user_id AND t.is_read = $1)
                   AS unread_count
            FROM feeds f
            WHERE f.user_id = $2
            ORDER BY f.id ASC
            "#,
        )
        .bind(false)
        .bind(user_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| FeedsyncError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| FeedWithUnread {
                feed: row.feed.into(),
                unread_count: row.unread_count,
            })
            .collect())
    }

    /// Rename a feed.
    pub async fn update_title(&self, id: i64, title: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE feeds SET title = $1 WHERE id = $2")
            .bind(title)
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| FeedsyncError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// File a feed under a folder, or take it out of any folder with `None`.
    pub async fn set_folder(&self, id: i64, folder_id: Option<i64>) -> Result<bool> {
        let result = sqlx::query("UPDATE feeds SET folder_id = $1 WHERE id = $2")
            .bind(folder_id)
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| FeedsyncError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a successful sync and reset the error counter.
    pub async fn mark_synced(
        &self,
        id: i64,
        user_id: &str,
        synced_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE feeds
            SET last_synced_at = $1, error_count = 0, last_error = NULL
            WHERE id = $2 AND user_id = $3
            "#,
        )
        .bind(synced_at.to_rfc3339())
        .bind(id)
        .bind(user_id)
        .execute(self.pool)
        .await
        .map_err(|e| FeedsyncError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Increment the error count and remember the message.
    pub async fn increment_error(&self, id: i64, user_id: &str, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE feeds
            SET error_count = error_count + 1, last_error = $1
            WHERE id = $2 AND user_id = $3
            "#,
        )
        .bind(error)
        .bind(id)
        .bind(user_id)
        .execute(self.pool)
        .await
        .map_err(|e| FeedsyncError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a feed. Its tracked articles go with it.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM feeds WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| FeedsyncError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
