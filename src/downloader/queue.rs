//! Download queue management: enqueueing, removal, and startup restore.

use std::sync::Arc;

use crate::error::{DownloadError, Error, Result};
use crate::types::{EpisodeId, Event, Status};
use crate::utils::sanitize_media_filename;

use super::{DownloadTask, PodcastDownloader};

impl PodcastDownloader {
    /// Queue an episode for download.
    ///
    /// At most one task exists per episode. Re-adding an episode whose task
    /// is already queued is idempotent: the stale queue entry is removed
    /// before the task is re-inserted, so it can never be picked up by two
    /// workers. Paused and failed tasks are re-queued the same way.
    ///
    /// Normal adds go to the queue head (workers pop from the tail, so the
    /// queue drains oldest-first). A force-started add goes to the tail and
    /// is therefore picked up next, and it may spawn a worker beyond the
    /// concurrency limit.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::AlreadyActive`] when the episode is downloading
    ///   right now
    /// - [`Error::ShuttingDown`] when shutdown has begun
    /// - [`DownloadError::NotFound`] when the episode does not exist
    pub async fn add_task(&self, episode_id: EpisodeId, force_start: bool) -> Result<()> {
        if !self
            .queue_state
            .accepting_new
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            return Err(Error::ShuttingDown);
        }

        let mut tasks = self.queue_state.tasks.lock().await;

        let task = match tasks.get(&episode_id) {
            Some(existing) => {
                if existing.status() == Status::Downloading {
                    return Err(Error::Download(DownloadError::AlreadyActive {
                        id: episode_id.get(),
                    }));
                }
                // Remove any stale queue entry so the task appears at most
                // once in the queue
                self.remove_from_queue(episode_id).await;
                existing.clone()
            }
            None => {
                let episode = self.db.get_episode(episode_id).await?.ok_or(Error::Download(
                    DownloadError::NotFound {
                        id: episode_id.get(),
                    },
                ))?;
                let podcast = self
                    .db
                    .get_podcast(crate::types::PodcastId(episode.podcast_id))
                    .await?
                    .ok_or_else(|| {
                        Error::NotFound(format!("Podcast {} not found", episode.podcast_id))
                    })?;

                let target_dir = self
                    .config
                    .download
                    .download_dir
                    .join(sanitize_media_filename(&podcast.title));
                let task = Arc::new(DownloadTask::new(&episode, target_dir));
                tasks.insert(episode_id, task.clone());
                task
            }
        };

        task.set_status(Status::Queued);
        self.db
            .set_download_status(episode_id, Status::Queued.to_i32())
            .await?;

        {
            let mut queue = self.queue_state.queue.lock().await;
            if force_start {
                // Tail position: the next pop picks this task up
                queue.push_back(task.clone());
            } else {
                queue.push_front(task.clone());
            }
        }
        drop(tasks);

        self.emit_event(Event::TaskQueued {
            id: episode_id,
            title: task.title().to_string(),
        });

        self.spawn_workers(force_start).await;

        Ok(())
    }

    /// Remove an episode's task from the pending queue without touching
    /// the task itself.
    ///
    /// Returns true if a queue entry was found and removed.
    pub(crate) async fn remove_from_queue(&self, episode_id: EpisodeId) -> bool {
        let mut queue = self.queue_state.queue.lock().await;
        let original_len = queue.len();
        queue.retain(|task| task.episode_id() != episode_id);
        queue.len() < original_len
    }

    /// Drop a task from the live-task map once it reaches a terminal state
    pub(crate) async fn recycle_task(&self, episode_id: EpisodeId) {
        let mut tasks = self.queue_state.tasks.lock().await;
        tasks.remove(&episode_id);
    }

    /// Restore interrupted downloads from the database on startup.
    ///
    /// Episodes still marked `Queued` or `Downloading` were interrupted by
    /// the previous session and are re-queued; their partial files allow
    /// the transfer to resume where it stopped. Paused episodes are not
    /// restored (the user explicitly paused them), and finished or failed
    /// ones are history.
    pub async fn restore_queue(&self) -> Result<()> {
        let interrupted = self.db.resumable_episodes().await?;

        if interrupted.is_empty() {
            tracing::info!("No interrupted downloads to restore");
            return Ok(());
        }

        tracing::info!(
            count = interrupted.len(),
            "Restoring interrupted downloads"
        );

        for episode in interrupted {
            let id = EpisodeId(episode.id);
            if let Err(e) = self.add_task(id, false).await {
                tracing::warn!(
                    episode_id = episode.id,
                    error = %e,
                    "Failed to restore interrupted download"
                );
            }
        }

        Ok(())
    }
}
