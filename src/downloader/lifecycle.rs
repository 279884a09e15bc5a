//! Startup and shutdown coordination.

use crate::error::Result;
use crate::types::{Event, Status};

use super::PodcastDownloader;

impl PodcastDownloader {
    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new downloads
    /// 2. Signals background loops (feed scheduler, sync worker) to stop
    /// 3. Pauses all active downloads (cooperative, at chunk boundaries)
    /// 4. Waits for workers to drain with a timeout (30 seconds)
    /// 5. Marks interrupted downloads as Paused for resume on restart
    /// 6. Marks a clean shutdown in the database
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new downloads
        self.queue_state
            .accepting_new
            .store(false, std::sync::atomic::Ordering::SeqCst);

        // 2. Stop background loops
        self.shutdown_token.cancel();

        // 3. Pause all active tasks; running transfers stop at their next
        // chunk and keep their partial files
        if let Err(e) = self.pause_all().await {
            tracing::warn!(error = %e, "Failed to pause downloads during shutdown");
        }

        // 4. Wait for worker loops to finish with a timeout
        let shutdown_timeout = std::time::Duration::from_secs(30);
        let wait_result = tokio::time::timeout(shutdown_timeout, self.wait_for_workers()).await;
        match wait_result {
            Ok(()) => tracing::info!("All queue workers finished"),
            Err(_) => tracing::warn!("Timeout waiting for workers, proceeding with shutdown"),
        }

        // 5. Persist interrupted state: anything still marked Downloading
        // was cut off and resumes as Paused next session
        if let Err(e) = self.persist_interrupted_state().await {
            tracing::error!(error = %e, "Failed to persist state during shutdown");
            // Continue with shutdown even if persistence fails
        }

        // 6. Mark clean shutdown in database
        if let Err(e) = self.db.set_clean_shutdown().await {
            tracing::error!(error = %e, "Failed to mark clean shutdown in database");
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Wait until no worker loops remain
    async fn wait_for_workers(&self) {
        loop {
            let worker_count = { self.queue_state.workers.lock().await.len() };
            if worker_count == 0 {
                return;
            }
            tracing::debug!(worker_count, "Waiting for queue workers to finish");
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }

    /// Mark episodes still recorded as Downloading as Paused so the next
    /// session resumes them from their partial files
    async fn persist_interrupted_state(&self) -> Result<()> {
        let interrupted = self
            .db
            .episodes_with_status(Status::Downloading.to_i32())
            .await?;

        for episode in &interrupted {
            self.db
                .set_download_status(
                    crate::types::EpisodeId(episode.id),
                    Status::Paused.to_i32(),
                )
                .await?;
        }

        if !interrupted.is_empty() {
            tracing::info!(
                count = interrupted.len(),
                "Marked interrupted downloads as Paused for resume on restart"
            );
        }

        Ok(())
    }
}
