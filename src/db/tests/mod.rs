mod episodes;
mod podcasts;

use super::{Database, NewEpisode, NewPodcast};
use crate::types::PodcastId;
use tempfile::NamedTempFile;

/// Open a fresh database backed by a temp file. Returns the handle and the
/// temp file (which must be kept alive for the duration of the test).
pub(crate) async fn test_db() -> (Database, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    (db, temp_file)
}

/// Insert a podcast with the given feed URL, returning its ID.
pub(crate) async fn insert_test_podcast(db: &Database, url: &str) -> PodcastId {
    db.insert_podcast(&NewPodcast {
        title: "Test Podcast".into(),
        url: url.into(),
        link: Some("https://example.com".into()),
        description: Some("A test feed".into()),
        cover_url: None,
    })
    .await
    .unwrap()
}

/// Build an episode row for the given podcast with a distinguishing number.
pub(crate) fn test_episode(podcast_id: PodcastId, n: i64) -> NewEpisode {
    NewEpisode {
        podcast_id,
        title: format!("Episode {n}"),
        description: None,
        url: format!("https://example.com/ep{n}.mp3"),
        guid: format!("guid-{n}"),
        link: None,
        published: 1_700_000_000 + n * 86_400,
        duration_secs: Some(1800),
        file_size: 1000,
        mime_type: Some("audio/mpeg".into()),
        is_new: true,
        download_filename: format!("Episode {n}.mp3"),
    }
}
