//! SQL-backed read-state store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::error;

use super::feed_repository::FeedRepository;
use super::types::{InsertOutcome, TrackedArticle};
use super::{ReadStateStore, SyncLedger};
use crate::db::{parse_datetime, DbPool};
use crate::{FeedsyncError, Result};

const TRACKED_COLUMNS: &str = "id, feed_id, user_id, guid, is_read, read_at, first_seen_at";

/// Row type for a tracked article.
#[derive(Debug, Clone, sqlx::FromRow)]
struct TrackedArticleRow {
    id: i64,
    feed_id: i64,
    user_id: String,
    guid: String,
    is_read: bool,
    read_at: Option<String>,
    first_seen_at: String,
}

impl From<TrackedArticleRow> for TrackedArticle {
    fn from(row: TrackedArticleRow) -> Self {
        TrackedArticle {
            id: row.id,
            feed_id: row.feed_id,
            user_id: row.user_id,
            guid: row.guid,
            is_read: row.is_read,
            read_at: row.read_at.and_then(|s| parse_datetime(&s)),
            first_seen_at: parse_datetime(&row.first_seen_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Read-state store over the database pool. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SqlStore {
    pool: DbPool,
}

impl SqlStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<TrackedArticle>> {
        let query = format!("SELECT {TRACKED_COLUMNS} FROM tracked_articles WHERE id = $1");
        let row = sqlx::query_as::<_, TrackedArticleRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| FeedsyncError::Database(e.to_string()))?;

        Ok(row.map(TrackedArticle::from))
    }

    async fn get_by_guid(
        &self,
        feed_id: i64,
        user_id: &str,
        guid: &str,
    ) -> Result<Option<TrackedArticle>> {
        let query = format!(
            "SELECT {TRACKED_COLUMNS} FROM tracked_articles \
             WHERE feed_id = $1 AND user_id = $2 AND guid = $3"
        );
        let row = sqlx::query_as::<_, TrackedArticleRow>(&query)
            .bind(feed_id)
            .bind(user_id)
            .bind(guid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| FeedsyncError::Database(e.to_string()))?;

        Ok(row.map(TrackedArticle::from))
    }
}

#[async_trait]
impl ReadStateStore for SqlStore {
    async fn get_tracked(&self, feed_id: i64, user_id: &str) -> Result<Vec<TrackedArticle>> {
        let query = format!(
            "SELECT {TRACKED_COLUMNS} FROM tracked_articles \
             WHERE feed_id = $1 AND user_id = $2 ORDER BY id ASC"
        );
        let rows = sqlx::query_as::<_, TrackedArticleRow>(&query)
            .bind(feed_id)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| FeedsyncError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(TrackedArticle::from).collect())
    }

    async fn insert_if_absent(
        &self,
        feed_id: i64,
        user_id: &str,
        guid: &str,
    ) -> Result<InsertOutcome> {
        let query = format!(
            r#"
            INSERT INTO tracked_articles (feed_id, user_id, guid, is_read, first_seen_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (feed_id, user_id, guid) DO NOTHING
            RETURNING {TRACKED_COLUMNS}
            "#
        );
        let inserted = sqlx::query_as::<_, TrackedArticleRow>(&query)
            .bind(feed_id)
            .bind(user_id)
            .bind(guid)
            .bind(false)
            .bind(Utc::now().to_rfc3339())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| FeedsyncError::Database(e.to_string()))?;

        if let Some(row) = inserted {
            return Ok(InsertOutcome::Inserted(row.into()));
        }

        // Lost the race or already tracked: hand back the stored row as-is.
        self.get_by_guid(feed_id, user_id, guid)
            .await?
            .map(InsertOutcome::Existing)
            .ok_or_else(|| FeedsyncError::NotFound("tracked article".into()))
    }

    async fn mark_read(&self, article_id: i64, user_id: &str) -> Result<TrackedArticle> {
        let article = self
            .get_by_id(article_id)
            .await?
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

        if article.is_read {
            return Ok(article);
        }

        // The is_read guard keeps read_at at its first value under races.
        sqlx::query(
            r#"
            UPDATE tracked_articles
            SET is_read = $1, read_at = $2
            WHERE id = $3 AND user_id = $4 AND is_read = $5
            "#,
        )
        .bind(true)
        .bind(Utc::now().to_rfc3339())
        .bind(article_id)
        .bind(user_id)
        .bind(false)
        .execute(&self.pool)
        .await
        .map_err(|e| FeedsyncError::Database(e.to_string()))?;

        self.get_by_id(article_id)
            .await?
            .ok_or_else(|| FeedsyncError::NotFound("tracked article".into()))
    }

    async fn mark_all_read(&self, feed_id: i64, user_id: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tracked_articles
            SET is_read = $1, read_at = $2
            WHERE feed_id = $3 AND user_id = $4 AND is_read = $5
            "#,
        )
        .bind(true)
        .bind(Utc::now().to_rfc3339())
        .bind(feed_id)
        .bind(user_id)
        .bind(false)
        .execute(&self.pool)
        .await
        .map_err(|e| FeedsyncError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn count_unread(&self, feed_id: i64, user_id: &str) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM tracked_articles
            WHERE feed_id = $1 AND user_id = $2 AND is_read = $3
            "#,
        )
        .bind(feed_id)
        .bind(user_id)
        .bind(false)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| FeedsyncError::Database(e.to_string()))?;

        Ok(count.0)
    }
}

#[async_trait]
impl SyncLedger for SqlStore {
    async fn record_sync_success(
        &self,
        feed_id: i64,
        user_id: &str,
        synced_at: DateTime<Utc>,
    ) -> Result<()> {
        if FeedRepository::new(&self.pool)
            .mark_synced(feed_id, user_id, synced_at)
            .await?
        {
            Ok(())
        } else {
            Err(FeedsyncError::NotFound("feed".into()))
        }
    }

    async fn record_sync_failure(
        &self,
        feed_id: i64,
        user_id: &str,
        message: &str,
    ) -> Result<()> {
        if FeedRepository::new(&self.pool)
            .increment_error(feed_id, user_id, message)
            .await?
        {
            Ok(())
        } else {
            Err(FeedsyncError::NotFound("feed".into()))
        }
    }
}
