use super::{insert_test_podcast, test_db, test_episode};
use crate::types::{EpisodeState, Status};

#[tokio::test]
async fn insert_and_get_episode_round_trips() {
    let (db, _file) = test_db().await;
    let podcast_id = insert_test_podcast(&db, "https://example.com/feed.xml").await;

    let id = db.insert_episode(&test_episode(podcast_id, 1)).await.unwrap();

    let episode = db.get_episode(id).await.unwrap().unwrap();
    assert_eq!(episode.title, "Episode 1");
    assert_eq!(episode.guid, "guid-1");
    assert_eq!(episode.state, EpisodeState::Normal.to_i32());
    assert_eq!(episode.is_new, 1);
    assert!(
        episode.download_status.is_none(),
        "no download was requested yet"
    );

    db.close().await;
}

#[tokio::test]
async fn get_episode_by_guid_is_scoped_to_podcast() {
    let (db, _file) = test_db().await;
    let podcast_a = insert_test_podcast(&db, "https://example.com/a.xml").await;
    let podcast_b = insert_test_podcast(&db, "https://example.com/b.xml").await;

    db.insert_episode(&test_episode(podcast_a, 1)).await.unwrap();

    assert!(
        db.get_episode_by_guid(podcast_a, "guid-1")
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        db.get_episode_by_guid(podcast_b, "guid-1")
            .await
            .unwrap()
            .is_none(),
        "GUIDs are unique per podcast, not global"
    );

    db.close().await;
}

#[tokio::test]
async fn get_episode_by_urls_joins_through_podcast() {
    let (db, _file) = test_db().await;
    let podcast_id = insert_test_podcast(&db, "https://example.com/feed.xml").await;
    db.insert_episode(&test_episode(podcast_id, 3)).await.unwrap();

    let found = db
        .get_episode_by_urls("https://example.com/feed.xml", "https://example.com/ep3.mp3")
        .await
        .unwrap();
    assert!(found.is_some());

    let missing = db
        .get_episode_by_urls("https://other.example/feed.xml", "https://example.com/ep3.mp3")
        .await
        .unwrap();
    assert!(missing.is_none(), "wrong podcast URL must not match");

    db.close().await;
}

#[tokio::test]
async fn list_episodes_orders_newest_first() {
    let (db, _file) = test_db().await;
    let podcast_id = insert_test_podcast(&db, "https://example.com/feed.xml").await;

    // Insert out of order; published grows with n
    for n in [2, 5, 1, 4] {
        db.insert_episode(&test_episode(podcast_id, n)).await.unwrap();
    }

    let episodes = db.list_episodes(podcast_id).await.unwrap();
    let titles: Vec<_> = episodes.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, ["Episode 5", "Episode 4", "Episode 2", "Episode 1"]);

    db.close().await;
}

#[tokio::test]
async fn newest_published_tracks_max() {
    let (db, _file) = test_db().await;
    let podcast_id = insert_test_podcast(&db, "https://example.com/feed.xml").await;

    assert!(db.newest_published(podcast_id).await.unwrap().is_none());

    db.insert_episode(&test_episode(podcast_id, 1)).await.unwrap();
    db.insert_episode(&test_episode(podcast_id, 7)).await.unwrap();

    let newest = db.newest_published(podcast_id).await.unwrap().unwrap();
    assert_eq!(newest, 1_700_000_000 + 7 * 86_400);

    db.close().await;
}

#[tokio::test]
async fn update_episode_from_feed_keeps_new_flag() {
    let (db, _file) = test_db().await;
    let podcast_id = insert_test_podcast(&db, "https://example.com/feed.xml").await;
    let id = db.insert_episode(&test_episode(podcast_id, 1)).await.unwrap();

    db.set_is_new(id, false).await.unwrap();

    db.update_episode_from_feed(
        id,
        "Episode 1 (remastered)",
        Some("new notes"),
        "https://example.com/ep1-v2.mp3",
        None,
        1_700_100_000,
        Some(1900),
        2000,
        Some("audio/mpeg"),
    )
    .await
    .unwrap();

    let episode = db.get_episode(id).await.unwrap().unwrap();
    assert_eq!(episode.title, "Episode 1 (remastered)");
    assert_eq!(episode.url, "https://example.com/ep1-v2.mp3");
    assert_eq!(episode.file_size, 2000);
    assert_eq!(
        episode.is_new, 0,
        "metadata updates must not resurrect the new flag"
    );

    db.close().await;
}

#[tokio::test]
async fn set_episode_downloaded_updates_state_size_and_flag() {
    let (db, _file) = test_db().await;
    let podcast_id = insert_test_podcast(&db, "https://example.com/feed.xml").await;
    let id = db.insert_episode(&test_episode(podcast_id, 1)).await.unwrap();

    db.set_is_new(id, false).await.unwrap();
    db.set_episode_downloaded(id, "Episode 1.mp3", 123_456, Some("audio/mpeg"))
        .await
        .unwrap();

    let episode = db.get_episode(id).await.unwrap().unwrap();
    assert_eq!(episode.state, EpisodeState::Downloaded.to_i32());
    assert_eq!(episode.is_new, 1, "completion re-marks the episode new");
    assert_eq!(episode.file_size, 123_456);
    assert_eq!(episode.download_status, Some(Status::Done.to_i32()));
    assert!(episode.error_message.is_none());

    db.close().await;
}

#[tokio::test]
async fn resumable_episodes_returns_queued_and_downloading_only() {
    let (db, _file) = test_db().await;
    let podcast_id = insert_test_podcast(&db, "https://example.com/feed.xml").await;

    let queued = db.insert_episode(&test_episode(podcast_id, 1)).await.unwrap();
    let downloading = db.insert_episode(&test_episode(podcast_id, 2)).await.unwrap();
    let paused = db.insert_episode(&test_episode(podcast_id, 3)).await.unwrap();
    let done = db.insert_episode(&test_episode(podcast_id, 4)).await.unwrap();
    let _untouched = db.insert_episode(&test_episode(podcast_id, 5)).await.unwrap();

    db.set_download_status(queued, Status::Queued.to_i32()).await.unwrap();
    db.set_download_status(downloading, Status::Downloading.to_i32())
        .await
        .unwrap();
    db.set_download_status(paused, Status::Paused.to_i32()).await.unwrap();
    db.set_download_status(done, Status::Done.to_i32()).await.unwrap();

    let resumable = db.resumable_episodes().await.unwrap();
    let ids: Vec<i64> = resumable.iter().map(|e| e.id).collect();
    assert_eq!(
        ids,
        vec![queued.get(), downloading.get()],
        "paused episodes stay paused and finished episodes are not restored"
    );

    db.close().await;
}

#[tokio::test]
async fn update_position_stores_position_and_timestamp() {
    let (db, _file) = test_db().await;
    let podcast_id = insert_test_podcast(&db, "https://example.com/feed.xml").await;
    let id = db.insert_episode(&test_episode(podcast_id, 1)).await.unwrap();

    db.update_position(id, 600, Some(1850), 1_700_000_500).await.unwrap();

    let episode = db.get_episode(id).await.unwrap().unwrap();
    assert_eq!(episode.current_position, 600);
    assert_eq!(episode.duration_secs, Some(1850));
    assert_eq!(episode.current_position_updated, 1_700_000_500);

    db.close().await;
}

#[tokio::test]
async fn enforce_max_episodes_deletes_oldest_normal_rows() {
    let (db, _file) = test_db().await;
    let podcast_id = insert_test_podcast(&db, "https://example.com/feed.xml").await;

    let mut ids = Vec::new();
    for n in 1..=5 {
        ids.push(db.insert_episode(&test_episode(podcast_id, n)).await.unwrap());
    }

    // Oldest episode is downloaded and must survive retention
    db.set_episode_downloaded(ids[0], "Episode 1.mp3", 1000, None)
        .await
        .unwrap();

    let deleted = db.enforce_max_episodes(podcast_id, 3).await.unwrap();
    assert_eq!(deleted, 1, "only episode 2 is old, normal, and beyond the limit");

    let remaining = db.list_episodes(podcast_id).await.unwrap();
    let titles: Vec<_> = remaining.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(
        titles,
        ["Episode 5", "Episode 4", "Episode 3", "Episode 1"],
        "downloaded episode 1 is retained, episode 2 purged"
    );

    db.close().await;
}
