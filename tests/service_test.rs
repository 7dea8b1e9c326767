//! Feed service tests: subscribing, organizing and read tracking.

#![cfg(feature = "sqlite")]

mod common;

use std::sync::Arc;

use common::{html_page, mount, rss_with_guids, serve_feed, test_service, HTML_TYPE, RSS_TYPE};
use feedsync::store::{ReadStateStore, SqlStore};
use feedsync::{spawn_read_marker, AddFeedRequest, FeedsyncError, ItemPosition};
use wiremock::MockServer;

#[tokio::test]
async fn test_add_feed_from_site_url() {
    let server = MockServer::start().await;
    let head = r#"<link rel="alternate" type="application/rss+xml" title="Posts" href="/posts.rss">"#;
    mount(&server, "/", HTML_TYPE, html_page(head)).await;
    mount(&server, "/posts.rss", RSS_TYPE, rss_with_guids(&["a"])).await;
    let (service, _db) = test_service().await;

    let feed = service
        .add_feed(&AddFeedRequest::new("alice", server.uri()))
        .await
        .unwrap();

    assert_eq!(feed.url, format!("{}/posts.rss", server.uri()));
    assert_eq!(feed.title, "Example Blog");
    assert_eq!(feed.user_id, "alice");
}

#[tokio::test]
async fn test_add_feed_custom_title_and_folder() {
    let server = MockServer::start().await;
    serve_feed(&server, &["a"]).await;
    let (service, _db) = test_service().await;
    let folder = service.create_folder("alice", "Blogs").await.unwrap();

    let feed = service
        .add_feed(
            &AddFeedRequest::new("alice", format!("{}/feed.xml", server.uri()))
                .with_title("My Blog")
                .with_folder(folder.id),
        )
        .await
        .unwrap();

    assert_eq!(feed.title, "My Blog");
    assert_eq!(feed.folder_id, Some(folder.id));
}

#[tokio::test]
async fn test_add_feed_rejects_duplicate_subscription() {
    let server = MockServer::start().await;
    serve_feed(&server, &["a"]).await;
    let (service, _db) = test_service().await;
    let url = format!("{}/feed.xml", server.uri());

    service
        .add_feed(&AddFeedRequest::new("alice", url.clone()))
        .await
        .unwrap();

    assert!(matches!(
        service.add_feed(&AddFeedRequest::new("alice", url.clone())).await,
        Err(FeedsyncError::Validation(_))
    ));
    // Another user may subscribe to the same URL.
    assert!(service.add_feed(&AddFeedRequest::new("bob", url)).await.is_ok());
}

#[tokio::test]
async fn test_add_feed_without_any_feed_fails() {
    let server = MockServer::start().await;
    mount(&server, "/", HTML_TYPE, html_page("")).await;
    let (service, _db) = test_service().await;

    let err = service
        .add_feed(&AddFeedRequest::new("alice", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, FeedsyncError::Validation(_)));
    assert!(service.list_feeds("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_add_feed_rejects_empty_url() {
    let (service, _db) = test_service().await;

    assert!(matches!(
        service.add_feed(&AddFeedRequest::new("alice", "   ")).await,
        Err(FeedsyncError::Validation(_))
    ));
}

#[tokio::test]
async fn test_delete_feed_removes_tracked_articles() {
    let server = MockServer::start().await;
    serve_feed(&server, &["a", "b"]).await;
    let (service, db) = test_service().await;
    let feed = service
        .add_feed(&AddFeedRequest::new("alice", format!("{}/feed.xml", server.uri())))
        .await
        .unwrap();
    service.sync_feed(feed.id, "alice").await.unwrap();

    service.delete_feed(feed.id, "alice").await.unwrap();

    let store = SqlStore::new(db.pool().clone());
    assert!(store.get_tracked(feed.id, "alice").await.unwrap().is_empty());
    assert!(matches!(
        service.get_feed(feed.id, "alice").await,
        Err(FeedsyncError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_folder_keeps_feeds() {
    let server = MockServer::start().await;
    serve_feed(&server, &["a"]).await;
    let (service, _db) = test_service().await;
    let folder = service.create_folder("alice", "Blogs").await.unwrap();
    let feed = service
        .add_feed(
            &AddFeedRequest::new("alice", format!("{}/feed.xml", server.uri()))
                .with_folder(folder.id),
        )
        .await
        .unwrap();

    service.delete_folder(folder.id, "alice").await.unwrap();

    let kept = service.get_feed(feed.id, "alice").await.unwrap();
    assert!(kept.folder_id.is_none());
}

#[tokio::test]
async fn test_mark_all_read() {
    let server = MockServer::start().await;
    serve_feed(&server, &["a", "b", "c"]).await;
    let (service, _db) = test_service().await;
    let feed = service
        .add_feed(&AddFeedRequest::new("alice", format!("{}/feed.xml", server.uri())))
        .await
        .unwrap();
    let outcome = service.sync_feed(feed.id, "alice").await.unwrap();
    service
        .mark_read(outcome.items[0].tracked_article_id, "alice")
        .await
        .unwrap();

    assert_eq!(service.mark_all_read(feed.id, "alice").await.unwrap(), 2);
    assert_eq!(service.mark_all_read(feed.id, "alice").await.unwrap(), 0);
    assert!(matches!(
        service.mark_all_read(feed.id, "bob").await,
        Err(FeedsyncError::Unauthorized(_))
    ));

    let resynced = service.sync_feed(feed.id, "alice").await.unwrap();
    assert!(resynced.items.iter().all(|i| i.is_read));
}

#[tokio::test]
async fn test_mark_read_of_foreign_article_is_refused() {
    let server = MockServer::start().await;
    serve_feed(&server, &["a"]).await;
    let (service, _db) = test_service().await;
    let feed = service
        .add_feed(&AddFeedRequest::new("alice", format!("{}/feed.xml", server.uri())))
        .await
        .unwrap();
    let outcome = service.sync_feed(feed.id, "alice").await.unwrap();
    let article_id = outcome.items[0].tracked_article_id;

    assert!(matches!(
        service.mark_read(article_id, "mallory").await,
        Err(FeedsyncError::Unauthorized(_))
    ));
    assert!(matches!(
        service.mark_read(article_id + 1000, "alice").await,
        Err(FeedsyncError::NotFound(_))
    ));

    let again = service.sync_feed(feed.id, "alice").await.unwrap();
    assert!(!again.items[0].is_read);
}

#[tokio::test]
async fn test_scrolling_marks_articles_read() {
    let server = MockServer::start().await;
    serve_feed(&server, &["a", "b", "c"]).await;
    let (service, db) = test_service().await;
    let feed = service
        .add_feed(&AddFeedRequest::new("alice", format!("{}/feed.xml", server.uri())))
        .await
        .unwrap();
    let outcome = service.sync_feed(feed.id, "alice").await.unwrap();
    let ids: Vec<_> = outcome
        .items
        .iter()
        .map(|i| i.tracked_article_id)
        .collect();

    let store = Arc::new(SqlStore::new(db.pool().clone()));
    let (mut tracker, handle) = spawn_read_marker(store, "alice");

    // Item heights of 100 in a 250 high viewport, scrolled down by 150.
    let layout = |index: usize, scroll: f64| {
        let top = index as f64 * 100.0 - scroll;
        ItemPosition::classify(top, top + 100.0, 0.0, 250.0)
    };
    for (index, id) in ids.iter().enumerate() {
        tracker.observe(*id, layout(index, 0.0));
    }
    for (index, id) in ids.iter().enumerate() {
        tracker.observe(*id, layout(index, 150.0));
    }
    // "b" and "c" are still in view; "c" gets opened.
    tracker.opened(ids[2]);
    drop(tracker);

    assert_eq!(handle.finish().await.unwrap(), 2);

    let resynced = service.sync_feed(feed.id, "alice").await.unwrap();
    let read: Vec<_> = resynced.items.iter().map(|i| i.is_read).collect();
    assert_eq!(read, vec![true, false, true]);
}
