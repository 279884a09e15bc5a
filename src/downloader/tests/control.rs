use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::downloader::test_helpers::{
    create_test_downloader, seed_episode, seed_podcast, wait_for_status,
};
use crate::error::{DownloadError, Error};
use crate::types::{EpisodeId, Status};

async fn mount_media(server: &MockServer, route: &str, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![b'x'; 256])
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

/// Occupy the single worker with a slow download and return a second
/// episode that is guaranteed to sit in the queue.
async fn downloader_with_queued_task(
    server: &MockServer,
) -> (
    crate::downloader::PodcastDownloader,
    tempfile::TempDir,
    EpisodeId,
) {
    mount_media(server, "/busy.mp3", Duration::from_millis(800)).await;
    mount_media(server, "/queued.mp3", Duration::from_millis(50)).await;

    let (downloader, dir) = create_test_downloader(|c| {
        c.download.max_concurrent_downloads = 1;
    })
    .await;

    let podcast = seed_podcast(&downloader, "Test Cast").await;
    let busy = seed_episode(&downloader, podcast, 0, &format!("{}/busy.mp3", server.uri())).await;
    let queued =
        seed_episode(&downloader, podcast, 1, &format!("{}/queued.mp3", server.uri())).await;

    downloader.add_task(busy, false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    downloader.add_task(queued, false).await.unwrap();

    (downloader, dir, queued)
}

#[tokio::test]
async fn pause_queued_task_removes_it_from_the_queue() {
    let server = MockServer::start().await;
    let (downloader, _dir, queued) = downloader_with_queued_task(&server).await;

    downloader.pause(queued).await.unwrap();

    {
        let queue = downloader.queue_state.queue.lock().await;
        assert!(
            queue.iter().all(|t| t.episode_id() != queued),
            "a paused task must leave the queue"
        );
    }

    let episode = downloader.db.get_episode(queued).await.unwrap().unwrap();
    assert_eq!(episode.download_status, Some(Status::Paused.to_i32()));

    // The paused task stays alive for resume
    let infos = downloader.list_downloads().await;
    assert!(infos.iter().any(|i| i.id == queued && i.status == Status::Paused));
}

#[tokio::test]
async fn pause_is_idempotent() {
    let server = MockServer::start().await;
    let (downloader, _dir, queued) = downloader_with_queued_task(&server).await;

    downloader.pause(queued).await.unwrap();
    downloader.pause(queued).await.unwrap();

    let episode = downloader.db.get_episode(queued).await.unwrap().unwrap();
    assert_eq!(episode.download_status, Some(Status::Paused.to_i32()));
}

#[tokio::test]
async fn resume_requeues_a_paused_task_to_completion() {
    let server = MockServer::start().await;
    let (downloader, _dir, queued) = downloader_with_queued_task(&server).await;

    downloader.pause(queued).await.unwrap();
    downloader.resume(queued).await.unwrap();

    wait_for_status(&downloader, queued, Status::Done, Duration::from_secs(5)).await;
}

#[tokio::test]
async fn resume_of_an_active_task_is_a_no_op() {
    let server = MockServer::start().await;
    let (downloader, _dir, queued) = downloader_with_queued_task(&server).await;

    // Queued task: resume must not duplicate the queue entry
    downloader.resume(queued).await.unwrap();

    let queue = downloader.queue_state.queue.lock().await;
    let entries = queue.iter().filter(|t| t.episode_id() == queued).count();
    assert_eq!(entries, 1);
}

#[tokio::test]
async fn cancel_queued_task_is_terminal() {
    let server = MockServer::start().await;
    let (downloader, _dir, queued) = downloader_with_queued_task(&server).await;

    downloader.cancel(queued).await.unwrap();

    let episode = downloader.db.get_episode(queued).await.unwrap().unwrap();
    assert_eq!(episode.download_status, Some(Status::Cancelled.to_i32()));

    {
        let queue = downloader.queue_state.queue.lock().await;
        assert!(queue.iter().all(|t| t.episode_id() != queued));
    }
    assert!(
        !downloader
            .list_downloads()
            .await
            .iter()
            .any(|i| i.id == queued),
        "cancelled tasks are recycled immediately"
    );
}

#[tokio::test]
async fn control_calls_on_unknown_episodes_are_not_found() {
    let (downloader, _dir) = create_test_downloader(|_| {}).await;

    for result in [
        downloader.pause(EpisodeId(404)).await,
        downloader.cancel(EpisodeId(404)).await,
    ] {
        assert!(
            matches!(
                result,
                Err(Error::Download(DownloadError::NotFound { id: 404 }))
            ),
            "control of a task-less episode must be NotFound"
        );
    }
}

#[tokio::test]
async fn resume_without_live_task_falls_back_to_persisted_status() {
    let server = MockServer::start().await;
    mount_media(&server, "/ep.mp3", Duration::from_millis(20)).await;

    let (downloader, _dir) = create_test_downloader(|_| {}).await;
    let podcast = seed_podcast(&downloader, "Test Cast").await;
    let id = seed_episode(&downloader, podcast, 1, &format!("{}/ep.mp3", server.uri())).await;

    // Paused in a previous session: status only exists in the database
    downloader
        .db
        .set_download_status(id, Status::Paused.to_i32())
        .await
        .unwrap();

    downloader.resume(id).await.unwrap();
    wait_for_status(&downloader, id, Status::Done, Duration::from_secs(5)).await;
}

#[tokio::test]
async fn pause_all_pauses_live_tasks_and_resume_all_finishes_them() {
    let server = MockServer::start().await;
    mount_media(&server, "/a.mp3", Duration::from_millis(400)).await;
    mount_media(&server, "/b.mp3", Duration::from_millis(50)).await;

    let (downloader, _dir) = create_test_downloader(|c| {
        c.download.max_concurrent_downloads = 1;
    })
    .await;
    let mut events = downloader.subscribe();

    let podcast = seed_podcast(&downloader, "Test Cast").await;
    let a = seed_episode(&downloader, podcast, 1, &format!("{}/a.mp3", server.uri())).await;
    let b = seed_episode(&downloader, podcast, 2, &format!("{}/b.mp3", server.uri())).await;

    downloader.add_task(a, false).await.unwrap();
    downloader.add_task(b, false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    downloader.pause_all().await.unwrap();

    wait_for_status(&downloader, a, Status::Paused, Duration::from_secs(5)).await;
    wait_for_status(&downloader, b, Status::Paused, Duration::from_secs(5)).await;

    let mut saw_queue_paused = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, crate::types::Event::QueuePaused) {
            saw_queue_paused = true;
        }
    }
    assert!(saw_queue_paused);

    downloader.resume_all().await.unwrap();
    wait_for_status(&downloader, a, Status::Done, Duration::from_secs(5)).await;
    wait_for_status(&downloader, b, Status::Done, Duration::from_secs(5)).await;
}
