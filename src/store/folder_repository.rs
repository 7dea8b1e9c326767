//! Folder repository.

use chrono::Utc;

use super::types::Folder;
use crate::db::{parse_datetime, DbPool};
use crate::{FeedsyncError, Result};

/// Row type for a folder.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FolderRow {
    id: i64,
    user_id: String,
    name: String,
    created_at: String,
}

impl From<FolderRow> for Folder {
    fn from(row: FolderRow) -> Self {
        Folder {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
        }
    }
}

/// Repository for folder operations.
pub struct FolderRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FolderRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a folder. Names are unique per user.
    pub async fn create(&self, user_id: &str, name: &str) -> Result<Folder> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO folders (user_id, name, created_at)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(name)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(self.pool)
        .await
        .map_err(|e| FeedsyncError::Database(e.to_string()))?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| FeedsyncError::NotFound("folder".into()))
    }

    /// Get a folder by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Folder>> {
        let row = sqlx::query_as::<_, FolderRow>(
            "SELECT id, user_id, name, created_at FROM folders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| FeedsyncError::Database(e.to_string()))?;

        Ok(row.map(Folder::from))
    }

    /// Get a user's folder by name.
    pub async fn get_by_name(&self, user_id: &str, name: &str) -> Result<Option<Folder>> {
        let row = sqlx::query_as::<_, FolderRow>(
            "SELECT id, user_id, name, created_at FROM folders WHERE user_id = $1 AND name = $2",
        )
        .bind(user_id)
        .bind(name)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| FeedsyncError::Database(e.to_string()))?;

        Ok(row.map(Folder::from))
    }

    /// List a user's folders by name.
    pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<Folder>> {
        let rows = sqlx::query_as::<_, FolderRow>(
            "SELECT id, user_id, name, created_at FROM folders WHERE user_id = $1 ORDER BY name ASC",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| FeedsyncError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Folder::from).collect())
    }

    /// Rename a folder.
    pub async fn rename(&self, id: i64, name: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE folders SET name = $1 WHERE id = $2")
            .bind(name)
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| FeedsyncError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a folder. Feeds filed under it stay, with no folder.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM folders WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| FeedsyncError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::store::{FeedRepository, NewFeed};
    use crate::Database;

    async fn setup_db() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_list_folders() {
        let db = setup_db().await;
        let repo = FolderRepository::new(db.pool());

        repo.create("alice", "Tech").await.unwrap();
        repo.create("alice", "Art").await.unwrap();
        repo.create("bob", "Mine").await.unwrap();

        let names: Vec<_> = repo
            .list_by_user("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["Art", "Tech"]);
    }

    #[tokio::test]
    async fn test_folder_names_unique_per_user() {
        let db = setup_db().await;
        let repo = FolderRepository::new(db.pool());

        repo.create("alice", "Tech").await.unwrap();
        assert!(repo.create("alice", "Tech").await.is_err());
        assert!(repo.create("bob", "Tech").await.is_ok());
    }

    #[tokio::test]
    async fn test_rename_and_get_by_name() {
        let db = setup_db().await;
        let repo = FolderRepository::new(db.pool());
        let folder = repo.create("alice", "Tech").await.unwrap();

        assert!(repo.rename(folder.id, "Technology").await.unwrap());
        assert!(repo.get_by_name("alice", "Tech").await.unwrap().is_none());
        let renamed = repo.get_by_name("alice", "Technology").await.unwrap().unwrap();
        assert_eq!(renamed.id, folder.id);
    }

    #[tokio::test]
    async fn test_delete_folder_keeps_feeds() {
        let db = setup_db().await;
        let folders = FolderRepository::new(db.pool());
        let feeds = FeedRepository::new(db.pool());

        let folder = folders.create("alice", "Tech").await.unwrap();
        let feed = feeds
            .create(&NewFeed::new("alice", "https://x/feed", "X").with_folder(folder.id))
            .await
            .unwrap();
        assert_eq!(feed.folder_id, Some(folder.id));

        assert!(folders.delete(folder.id).await.unwrap());

        let orphan = feeds.get_by_id(feed.id).await.unwrap().unwrap();
        assert!(orphan.folder_id.is_none());
    }
}
