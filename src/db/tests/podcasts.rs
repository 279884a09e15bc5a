use super::{insert_test_podcast, test_db};
use crate::db::NewPodcast;
use crate::error::{DatabaseError, Error};
use crate::types::{DownloadStrategy, PodcastId};

#[tokio::test]
async fn insert_and_get_podcast_round_trips() {
    let (db, _file) = test_db().await;

    let id = insert_test_podcast(&db, "https://example.com/feed.xml").await;

    let podcast = db.get_podcast(id).await.unwrap().unwrap();
    assert_eq!(podcast.title, "Test Podcast");
    assert_eq!(podcast.url, "https://example.com/feed.xml");
    assert_eq!(podcast.enabled, 1, "new subscriptions start enabled");
    assert_eq!(
        podcast.download_strategy,
        DownloadStrategy::Default.to_i32()
    );
    assert!(podcast.last_check.is_none());

    db.close().await;
}

#[tokio::test]
async fn get_podcast_by_url_finds_subscription() {
    let (db, _file) = test_db().await;

    insert_test_podcast(&db, "https://example.com/a.xml").await;
    let id_b = insert_test_podcast(&db, "https://example.com/b.xml").await;

    let found = db
        .get_podcast_by_url("https://example.com/b.xml")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(PodcastId(found.id), id_b);

    assert!(
        db.get_podcast_by_url("https://example.com/missing.xml")
            .await
            .unwrap()
            .is_none()
    );

    db.close().await;
}

#[tokio::test]
async fn duplicate_feed_url_is_a_constraint_violation() {
    let (db, _file) = test_db().await;

    insert_test_podcast(&db, "https://example.com/feed.xml").await;

    let result = db
        .insert_podcast(&NewPodcast {
            title: "Duplicate".into(),
            url: "https://example.com/feed.xml".into(),
            link: None,
            description: None,
            cover_url: None,
        })
        .await;

    match result {
        Err(Error::Database(DatabaseError::ConstraintViolation(msg))) => {
            assert!(msg.contains("feed.xml"), "got: {msg}");
        }
        other => panic!("expected ConstraintViolation, got: {:?}", other),
    }

    db.close().await;
}

#[tokio::test]
async fn delete_podcast_cascades_to_episodes() {
    let (db, _file) = test_db().await;

    let id = insert_test_podcast(&db, "https://example.com/feed.xml").await;
    db.insert_episode(&super::test_episode(id, 1)).await.unwrap();
    db.insert_episode(&super::test_episode(id, 2)).await.unwrap();

    assert_eq!(db.list_episodes(id).await.unwrap().len(), 2);

    db.delete_podcast(id).await.unwrap();

    assert!(db.get_podcast(id).await.unwrap().is_none());
    assert_eq!(
        db.list_episodes(id).await.unwrap().len(),
        0,
        "episodes must be removed with their podcast"
    );

    db.close().await;
}

#[tokio::test]
async fn set_podcast_checked_records_time_and_error() {
    let (db, _file) = test_db().await;

    let id = insert_test_podcast(&db, "https://example.com/feed.xml").await;

    db.set_podcast_checked(id, None).await.unwrap();
    let podcast = db.get_podcast(id).await.unwrap().unwrap();
    assert!(podcast.last_check.is_some());
    assert!(podcast.last_error.is_none());

    db.set_podcast_checked(id, Some("HTTP error 503"))
        .await
        .unwrap();
    let podcast = db.get_podcast(id).await.unwrap().unwrap();
    assert_eq!(podcast.last_error.as_deref(), Some("HTTP error 503"));

    db.close().await;
}

#[tokio::test]
async fn disabled_podcasts_are_excluded_from_scheduler_list() {
    let (db, _file) = test_db().await;

    let id_a = insert_test_podcast(&db, "https://example.com/a.xml").await;
    let id_b = insert_test_podcast(&db, "https://example.com/b.xml").await;

    db.set_podcast_enabled(id_a, false).await.unwrap();

    let enabled = db.list_enabled_podcasts().await.unwrap();
    assert_eq!(enabled.len(), 1);
    assert_eq!(PodcastId(enabled[0].id), id_b);

    db.close().await;
}

#[tokio::test]
async fn update_podcast_url_replaces_feed_url() {
    let (db, _file) = test_db().await;

    let id = insert_test_podcast(&db, "http://example.com/feed").await;
    db.update_podcast_url(id, "https://example.com/feed.xml")
        .await
        .unwrap();

    let podcast = db.get_podcast(id).await.unwrap().unwrap();
    assert_eq!(podcast.url, "https://example.com/feed.xml");

    db.close().await;
}

#[tokio::test]
async fn set_download_strategy_persists() {
    let (db, _file) = test_db().await;

    let id = insert_test_podcast(&db, "https://example.com/feed.xml").await;
    db.set_download_strategy(id, DownloadStrategy::OnlyLatest.to_i32())
        .await
        .unwrap();

    let podcast = db.get_podcast(id).await.unwrap().unwrap();
    assert_eq!(
        DownloadStrategy::from_i32(podcast.download_strategy),
        DownloadStrategy::OnlyLatest
    );

    db.close().await;
}
