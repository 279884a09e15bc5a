//! Shared test helpers for creating PodcastDownloader instances in tests.

use std::time::Duration;

use tempfile::TempDir;

use crate::config::Config;
use crate::db::{NewEpisode, NewPodcast};
use crate::downloader::PodcastDownloader;
use crate::types::{EpisodeId, PodcastId, Status};

/// Create a test PodcastDownloader backed by a temp directory.
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader(
    configure: impl FnOnce(&mut Config),
) -> (PodcastDownloader, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.persistence.database_path = temp_dir.path().join("test.db");
    config.download.download_dir = temp_dir.path().join("downloads");
    config.download.max_concurrent_downloads = 3;
    // Fast retries so failure-path tests don't sleep for real seconds
    config.retry.initial_delay = Duration::from_millis(10);
    configure(&mut config);

    let downloader = PodcastDownloader::new(config).await.unwrap();
    (downloader, temp_dir)
}

/// Insert a podcast subscription row
pub(crate) async fn seed_podcast(downloader: &PodcastDownloader, title: &str) -> PodcastId {
    downloader
        .db
        .insert_podcast(&NewPodcast {
            title: title.into(),
            url: format!("https://example.com/{title}.xml"),
            link: None,
            description: None,
            cover_url: None,
        })
        .await
        .unwrap()
}

/// Insert an episode row whose enclosure points at `url`
pub(crate) async fn seed_episode(
    downloader: &PodcastDownloader,
    podcast_id: PodcastId,
    n: i64,
    url: &str,
) -> EpisodeId {
    downloader
        .db
        .insert_episode(&NewEpisode {
            podcast_id,
            title: format!("Episode {n}"),
            description: None,
            url: url.into(),
            guid: format!("guid-{n}"),
            link: None,
            published: 1_700_000_000 + n * 86_400,
            duration_secs: Some(1800),
            file_size: 0,
            mime_type: Some("audio/mpeg".into()),
            is_new: true,
            download_filename: format!("Episode {n}.mp3"),
        })
        .await
        .unwrap()
}

/// Poll the database until the episode's download status matches, or panic
/// after the timeout.
pub(crate) async fn wait_for_status(
    downloader: &PodcastDownloader,
    id: EpisodeId,
    expected: Status,
    timeout: Duration,
) {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        let episode = downloader.db.get_episode(id).await.unwrap().unwrap();
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
