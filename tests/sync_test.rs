//! End-to-end sync tests against a mock feed server and SQLite.

#![cfg(feature = "sqlite")]

mod common;

use common::{serve_feed, test_service};
use feedsync::store::{FeedRepository, ReadStateStore, SqlStore};
use feedsync::{AddFeedRequest, FeedsyncError, FetchError, ParseError, SyncError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_first_sync_tracks_all_items_unread() {
    let server = MockServer::start().await;
    serve_feed(&server, &["a", "b", "c"]).await;
    let (service, db) = test_service().await;

    let feed = service
        .add_feed(&AddFeedRequest::new("alice", format!("{}/feed.xml", server.uri())))
        .await
        .unwrap();
    assert_eq!(feed.title, "Example Blog");
    assert_eq!(feed.site_url.as_deref(), Some("https://example.com/"));

    let outcome = service.sync_feed(feed.id, "alice").await.unwrap();

    assert_eq!(outcome.new_count, 3);
    let identities: Vec<_> = outcome.items.iter().map(|i| i.identity.as_str()).collect();
    assert_eq!(identities, vec!["a", "b", "c"]);
    assert!(outcome.items.iter().all(|i| !i.is_read));
    assert_eq!(
        outcome.items[0].item.content_snippet.as_deref(),
        Some("Body of a")
    );

    let store = SqlStore::new(db.pool().clone());
    let tracked = store.get_tracked(feed.id, "alice").await.unwrap();
    assert_eq!(tracked.len(), 3);
    assert!(tracked.iter().all(|t| !t.is_read && t.read_at.is_none()));

    let synced = service.get_feed(feed.id, "alice").await.unwrap();
    assert_eq!(synced.last_synced_at, Some(outcome.synced_at));
}

#[tokio::test]
async fn test_partial_overlap_keeps_history() {
    let server = MockServer::start().await;
    serve_feed(&server, &["a", "b", "c"]).await;
    let (service, db) = test_service().await;
    let feed = service
        .add_feed(&AddFeedRequest::new("alice", format!("{}/feed.xml", server.uri())))
        .await
        .unwrap();
    service.sync_feed(feed.id, "alice").await.unwrap();

    serve_feed(&server, &["b", "c", "d"]).await;
    let outcome = service.sync_feed(feed.id, "alice").await.unwrap();

    assert_eq!(outcome.new_count, 1);
    let new: Vec<_> = outcome
        .items
        .iter()
        .filter(|i| i.is_new)
        .map(|i| i.identity.as_str())
        .collect();
    assert_eq!(new, vec!["d"]);

    let store = SqlStore::new(db.pool().clone());
    let guids: Vec<_> = store
        .get_tracked(feed.id, "alice")
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.guid)
        .collect();
    assert_eq!(guids, vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn test_read_state_survives_resync() {
    let server = MockServer::start().await;
    serve_feed(&server, &["a", "b", "c"]).await;
    let (service, _db) = test_service().await;
    let feed = service
        .add_feed(&AddFeedRequest::new("alice", format!("{}/feed.xml", server.uri())))
        .await
        .unwrap();

    let first = service.sync_feed(feed.id, "alice").await.unwrap();
    let b = first.items.iter().find(|i| i.identity == "b").unwrap();
    let marked = service.mark_read(b.tracked_article_id, "alice").await.unwrap();
    assert!(marked.is_read);

    let second = service.sync_feed(feed.id, "alice").await.unwrap();

    assert_eq!(second.new_count, 0);
    let b = second.items.iter().find(|i| i.identity == "b").unwrap();
    assert!(b.is_read);
    assert_eq!(b.read_at, marked.read_at);
    assert_eq!(second.items.iter().filter(|i| i.is_read).count(), 1);

    let feeds = service.list_feeds("alice").await.unwrap();
    assert_eq!(feeds[0].unread_count, 2);
}

#[tokio::test]
async fn test_malformed_feed_leaves_store_untouched() {
    let server = MockServer::start().await;
    serve_feed(&server, &["a"]).await;
    let (service, db) = test_service().await;
    let feed = service
        .add_feed(&AddFeedRequest::new("alice", format!("{}/feed.xml", server.uri())))
        .await
        .unwrap();

    server.reset().await;
    common::mount(&server, "/feed.xml", common::RSS_TYPE, "<rss><channel>".to_string()).await;

    let err = service.sync_feed(feed.id, "alice").await.unwrap_err();

    match err {
        FeedsyncError::Sync(e) => {
            assert!(matches!(e, SyncError::Parse(ParseError::Malformed(_))));
            assert_eq!(e.user_message(), "The feed could not be read.");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let store = SqlStore::new(db.pool().clone());
    assert!(store.get_tracked(feed.id, "alice").await.unwrap().is_empty());

    let failed = FeedRepository::new(db.pool())
        .get_by_id(feed.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.error_count, 1);
    assert!(failed.last_error.is_some());
    assert!(failed.last_synced_at.is_none());
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;
    serve_feed(&server, &["a"]).await;
    let (service, _db) = test_service().await;
    let feed = service
        .add_feed(&AddFeedRequest::new("alice", format!("{}/feed.xml", server.uri())))
        .await
        .unwrap();

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = service.sync_feed(feed.id, "alice").await.unwrap_err();

    assert!(matches!(
        err,
        FeedsyncError::Sync(SyncError::Fetch(FetchError::HttpStatus(404)))
    ));
    server.verify().await;
}

#[tokio::test]
async fn test_server_error_is_retried_once() {
    let server = MockServer::start().await;
    serve_feed(&server, &["a"]).await;
    let (service, _db) = test_service().await;
    let feed = service
        .add_feed(&AddFeedRequest::new("alice", format!("{}/feed.xml", server.uri())))
        .await
        .unwrap();

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    common::mount(
        &server,
        "/feed.xml",
        common::RSS_TYPE,
        common::rss_with_guids(&["a", "b"]),
    )
    .await;

    let outcome = service.sync_feed(feed.id, "alice").await.unwrap();

    assert_eq!(outcome.new_count, 2);
    server.verify().await;
}

#[tokio::test]
async fn test_sync_of_foreign_feed_is_refused() {
    let server = MockServer::start().await;
    serve_feed(&server, &["a"]).await;
    let (service, db) = test_service().await;
    let feed = service
        .add_feed(&AddFeedRequest::new("alice", format!("{}/feed.xml", server.uri())))
        .await
        .unwrap();

    let err = service.sync_feed(feed.id, "mallory").await.unwrap_err();

    assert!(matches!(err, FeedsyncError::Unauthorized(_)));
    let store = SqlStore::new(db.pool().clone());
    assert!(store.get_tracked(feed.id, "mallory").await.unwrap().is_empty());
    assert!(store.get_tracked(feed.id, "alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_idempotent_resync() {
    let server = MockServer::start().await;
    serve_feed(&server, &["a", "b"]).await;
    let (service, db) = test_service().await;
    let feed = service
        .add_feed(&AddFeedRequest::new("alice", format!("{}/feed.xml", server.uri())))
        .await
        .unwrap();
    let store = SqlStore::new(db.pool().clone());

    service.sync_feed(feed.id, "alice").await.unwrap();
    let before = store.get_tracked(feed.id, "alice").await.unwrap();

    let again = service.sync_feed(feed.id, "alice").await.unwrap();
    let after = store.get_tracked(feed.id, "alice").await.unwrap();

    assert_eq!(again.new_count, 0);
    assert_eq!(before, after);
}
