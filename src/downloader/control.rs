//! Download lifecycle control — pause, resume, cancel.

use crate::error::{DownloadError, Error, Result};
use crate::types::{EpisodeId, Event, Status};

use super::PodcastDownloader;

impl PodcastDownloader {
    /// Pause a download.
    ///
    /// A queued task leaves the queue immediately; a downloading task
    /// stops at its next chunk boundary (cooperative). The partial file is
    /// kept in both cases so the download can resume where it stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if no live task exists for the episode or the
    /// task is in a state that cannot be paused.
    pub async fn pause(&self, id: EpisodeId) -> Result<()> {
        let task = {
            let tasks = self.queue_state.tasks.lock().await;
            tasks.get(&id).cloned()
        };

        let Some(task) = task else {
            return Err(Error::Download(DownloadError::NotFound { id: id.get() }));
        };

        match task.status() {
            Status::Paused => {
                // Already paused, nothing to do
                return Ok(());
            }
            Status::Queued => {
                self.remove_from_queue(id).await;
                task.set_status(Status::Paused);
                self.db.set_download_status(id, Status::Paused.to_i32()).await?;
                self.emit_event(Event::DownloadPaused { id });
            }
            Status::Downloading => {
                // The fetch loop observes the flip at its next chunk and
                // persists the state itself
                task.set_status(Status::Paused);
            }
            other => {
                return Err(Error::Download(DownloadError::InvalidState {
                    id: id.get(),
                    operation: "pause".to_string(),
                    current_state: format!("{:?}", other),
                }));
            }
        }

        Ok(())
    }

    /// Resume a paused or failed download by re-queueing its episode.
    ///
    /// Queued and downloading tasks are left alone (idempotent). The
    /// partial file on disk makes the resumed transfer continue from
    /// where it stopped.
    pub async fn resume(&self, id: EpisodeId) -> Result<()> {
        let task = {
            let tasks = self.queue_state.tasks.lock().await;
            tasks.get(&id).cloned()
        };

        match task {
            Some(task) => match task.status() {
                Status::Queued | Status::Downloading => Ok(()),
                Status::Paused | Status::Failed => self.add_task(id, false).await,
                other => Err(Error::Download(DownloadError::InvalidState {
                    id: id.get(),
                    operation: "resume".to_string(),
                    current_state: format!("{:?}", other),
                })),
            },
            None => {
                // No live task (e.g. paused before a restart): fall back
                // to the persisted download status
                let episode = self.db.get_episode(id).await?.ok_or(Error::Download(
                    DownloadError::NotFound { id: id.get() },
                ))?;
                match episode.download_status.map(Status::from_i32) {
                    Some(Status::Paused) | Some(Status::Failed) => self.add_task(id, false).await,
                    other => Err(Error::Download(DownloadError::InvalidState {
                        id: id.get(),
                        operation: "resume".to_string(),
                        current_state: format!("{:?}", other),
                    })),
                }
            }
        }
    }

    /// Cancel a download and delete its partial file.
    ///
    /// A queued or paused task is finalized immediately; a downloading
    /// task stops at its next chunk boundary and deletes the partial file
    /// there. Cancelled is terminal — re-downloading creates a new task.
    pub async fn cancel(&self, id: EpisodeId) -> Result<()> {
        let task = {
            let tasks = self.queue_state.tasks.lock().await;
            tasks.get(&id).cloned()
        };

        let Some(task) = task else {
            return Err(Error::Download(DownloadError::NotFound { id: id.get() }));
        };

        match task.status() {
            Status::Queued | Status::Paused => {
                self.remove_from_queue(id).await;
                task.set_status(Status::Cancelled);

                let path = task.partial_path();
                if let Err(e) = tokio::fs::remove_file(&path).await
                    && e.kind() != std::io::ErrorKind::NotFound
                {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to delete partial file");
                }

                self.db
                    .set_download_status(id, Status::Cancelled.to_i32())
                    .await?;
                self.emit_event(Event::DownloadCancelled { id });
                self.emit_event(Event::TaskRemoved { id });
                self.recycle_task(id).await;
            }
            Status::Downloading => {
                // The fetch loop observes the flip, deletes the partial
                // file, and recycles the task
                task.set_status(Status::Cancelled);
            }
            other => {
                return Err(Error::Download(DownloadError::InvalidState {
                    id: id.get(),
                    operation: "cancel".to_string(),
                    current_state: format!("{:?}", other),
                }));
            }
        }

        Ok(())
    }

    /// Pause every queued or downloading task
    pub async fn pause_all(&self) -> Result<()> {
        let ids: Vec<EpisodeId> = {
            let tasks = self.queue_state.tasks.lock().await;
            tasks
                .iter()
                .filter(|(_, t)| matches!(t.status(), Status::Queued | Status::Downloading))
                .map(|(id, _)| *id)
                .collect()
        };

        let mut paused_count = 0;
        for id in ids {
            if let Err(e) = self.pause(id).await {
                tracing::warn!(episode_id = id.0, error = %e, "Failed to pause download during pause_all");
                // Continue with other downloads
            } else {
                paused_count += 1;
            }
        }

        tracing::info!(paused_count, "Paused all active downloads");
        self.emit_event(Event::QueuePaused);

        Ok(())
    }

    /// Resume every paused task (live handles and persisted paused rows)
    pub async fn resume_all(&self) -> Result<()> {
        let mut ids: Vec<EpisodeId> = {
            let tasks = self.queue_state.tasks.lock().await;
            tasks
                .iter()
                .filter(|(_, t)| t.status() == Status::Paused)
                .map(|(id, _)| *id)
                .collect()
        };

        // Paused rows from a previous session have no live task yet
        for episode in self
            .db
            .episodes_with_status(Status::Paused.to_i32())
            .await?
        {
            let id = EpisodeId(episode.id);
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        let mut resumed_count = 0;
        for id in ids {
            if let Err(e) = self.resume(id).await {
                tracing::warn!(episode_id = id.0, error = %e, "Failed to resume download during resume_all");
                // Continue with other downloads
            } else {
                resumed_count += 1;
            }
        }

        tracing::info!(resumed_count, "Resumed all paused downloads");
        self.emit_event(Event::QueueResumed);

        Ok(())
    }
}
