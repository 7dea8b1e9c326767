//! Database schema and migrations for feedsync.
//!
//! Migrations are applied in order when the database is opened. The
//! `schema_version` table records which ones have already run. All
//! timestamps are RFC 3339 text written by the application.

/// Database migrations (SQLite).
#[cfg(feature = "sqlite")]
pub const MIGRATIONS: &[&str] = &[
    // v1: folders, feeds and per-user tracked articles
    r#"
CREATE TABLE folders (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     TEXT NOT NULL,
    name        TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    UNIQUE (user_id, name)
);

CREATE TABLE feeds (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id         TEXT NOT NULL,
    url             TEXT NOT NULL,
    title           TEXT NOT NULL,
    site_url        TEXT,
    folder_id       INTEGER REFERENCES folders(id) ON DELETE SET NULL,
    last_synced_at  TEXT,
    error_count     INTEGER NOT NULL DEFAULT 0,
    last_error      TEXT,
    created_at      TEXT NOT NULL,
    UNIQUE (user_id, url)
);

CREATE INDEX idx_feeds_user ON feeds(user_id);
CREATE INDEX idx_feeds_folder ON feeds(folder_id);

-- Read state only. Article content is never persisted.
CREATE TABLE tracked_articles (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    feed_id        INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
    user_id        TEXT NOT NULL,
    guid           TEXT NOT NULL,
    is_read        INTEGER NOT NULL DEFAULT 0,
    read_at        TEXT,
    first_seen_at  TEXT NOT NULL,
    UNIQUE (feed_id, user_id, guid)
);

CREATE INDEX idx_tracked_articles_unread ON tracked_articles(feed_id, user_id, is_read);
"#,
];

/// Database migrations (PostgreSQL).
#[cfg(feature = "postgres")]
pub const MIGRATIONS: &[&str] = &[
    // v1: folders, feeds and per-user tracked articles
    r#"
CREATE TABLE folders (
    id          BIGSERIAL PRIMARY KEY,
    user_id     TEXT NOT NULL,
    name        TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    UNIQUE (user_id, name)
);

CREATE TABLE feeds (
    id              BIGSERIAL PRIMARY KEY,
    user_id         TEXT NOT NULL,
    url             TEXT NOT NULL,
    title           TEXT NOT NULL,
    site_url        TEXT,
    folder_id       BIGINT REFERENCES folders(id) ON DELETE SET NULL,
    last_synced_at  TEXT,
    error_count     INTEGER NOT NULL DEFAULT 0,
    last_error      TEXT,
    created_at      TEXT NOT NULL,
    UNIQUE (user_id, url)
);

CREATE INDEX idx_feeds_user ON feeds(user_id);
CREATE INDEX idx_feeds_folder ON feeds(folder_id);

CREATE TABLE tracked_articles (
    id             BIGSERIAL PRIMARY KEY,
    feed_id        BIGINT NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
    user_id        TEXT NOT NULL,
    guid           TEXT NOT NULL,
    is_read        BOOLEAN NOT NULL DEFAULT FALSE,
    read_at        TEXT,
    first_seen_at  TEXT NOT NULL,
    UNIQUE (feed_id, user_id, guid)
);

CREATE INDEX idx_tracked_articles_unread ON tracked_articles(feed_id, user_id, is_read);
"#,
];
