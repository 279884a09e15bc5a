//! Shared helpers for integration tests.

use std::time::Duration;

use podcast_dl::{Config, EpisodeId, PodcastDownloader, Status};
use tempfile::TempDir;

/// Build a downloader rooted in a fresh temp directory.
pub async fn test_downloader(configure: impl FnOnce(&mut Config)) -> (PodcastDownloader, TempDir) {
    let temp_dir = tempfile::tempdir().expect("create temp dir");

    let mut config = Config::default();
    config.persistence.database_path = temp_dir.path().join("podcast-dl.db");
    config.download.download_dir = temp_dir.path().join("downloads");
    config.retry.initial_delay = Duration::from_millis(10);
    configure(&mut config);

    let downloader = PodcastDownloader::new(config).await.expect("create downloader");
    (downloader, temp_dir)
}

/// Poll until the episode's download status matches, panicking on timeout.
pub async fn wait_for_status(
    downloader: &PodcastDownloader,
    id: EpisodeId,
    expected: Status,
    timeout: Duration,
) {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        let episode = downloader
            .db
            .get_episode(id)
            .await
            .expect("query episode")
            .expect("episode exists");
        if episode.download_status == Some(expected.to_i32()) {
            return;
        }
        if std::time::Instant::now() > deadline {
            panic!(
                "episode {id} never reached {expected:?}; status = {:?}, error = {:?}",
                episode.download_status.map(Status::from_i32),
                episode.error_message
            );
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// A minimal RSS document with one enclosure per entry.
pub fn rss_feed(title: &str, enclosures: &[(&str, &str)]) -> String {
    let items: String = enclosures
        .iter()
        .map(|(item_title, url)| {
            format!(
                r#"<item>
  <title>{item_title}</title>
  <guid>{item_title}-guid</guid>
  <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
  <enclosure url="{url}" length="0" type="audio/mpeg"/>
</item>"#
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>{title}</title>
    <description>Integration test feed</description>
    <link>https://example.com</link>
    {items}
  </channel>
</rss>"#
    )
}
