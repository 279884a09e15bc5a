//! HTTP download execution: range resume, retry, cooperative pause/cancel,
//! and rename-on-redirect finalization.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::error::{DownloadError, Error, Result};
use crate::retry::{RETRYABLE_HTTP_STATUSES, with_retry};
use crate::types::{EpisodeActionKind, EpisodeState, Event, PodcastId, Status};
use crate::utils;

use super::{DownloadTask, PodcastDownloader};

/// How often progress events and speed samples are published
const PROGRESS_INTERVAL: Duration = Duration::from_millis(1000);

/// What one fetch attempt ended with
enum FetchOutcome {
    /// Transfer finished; the partial file holds the complete payload
    Completed(CompletedFetch),
    /// User paused; the partial file is kept for resume
    Paused,
    /// User cancelled; the partial file was deleted
    Cancelled,
}

/// Server-reported details captured from a completed transfer, used for
/// filename finalization
struct CompletedFetch {
    /// Mimetype from the Content-Type header
    content_type: Option<String>,
    /// Filename from the Content-Disposition header
    disposition_name: Option<String>,
    /// Basename of the final (post-redirect) URL when it differs from the
    /// requested URL
    redirect_name: Option<String>,
    /// Bytes on disk after the transfer
    bytes_on_disk: u64,
}

impl PodcastDownloader {
    /// Run one download task to completion.
    ///
    /// All failure paths are contained here: the task ends in `Done`,
    /// `Paused`, `Cancelled`, or `Failed`, never stuck in `Downloading`.
    /// Workers call this and need no error handling of their own.
    pub(crate) async fn run_task(&self, task: Arc<DownloadTask>) {
        let id = task.episode_id();

        task.set_status(Status::Downloading);
        if let Err(e) = self
            .db
            .set_download_status(id, Status::Downloading.to_i32())
            .await
        {
            tracing::error!(episode_id = id.0, error = %e, "Failed to persist Downloading status");
        }

        let outcome = self.execute_download(&task).await;

        match outcome {
            Ok(FetchOutcome::Completed(done)) => {
                if let Err(e) = self.finish_download(&task, done).await {
                    tracing::error!(episode_id = id.0, error = %e, "Finalization failed");
                    self.mark_task_failed(&task, format!("Failed to finalize download: {e}"))
                        .await;
                    self.recycle_task(id).await;
                }
            }
            Ok(FetchOutcome::Paused) => {
                task.set_status(Status::Paused);
                task.set_speed_bps(0);
                if let Err(e) = self.db.set_download_status(id, Status::Paused.to_i32()).await {
                    tracing::error!(episode_id = id.0, error = %e, "Failed to persist Paused status");
                }
                self.emit_event(Event::DownloadPaused { id });
                // Paused tasks stay in the task map; resume re-queues them
            }
            Ok(FetchOutcome::Cancelled) => {
                task.set_status(Status::Cancelled);
                task.set_speed_bps(0);
                if let Err(e) = self
                    .db
                    .set_download_status(id, Status::Cancelled.to_i32())
                    .await
                {
                    tracing::error!(episode_id = id.0, error = %e, "Failed to persist Cancelled status");
                }
                self.emit_event(Event::DownloadCancelled { id });
                self.recycle_task(id).await;
            }
            Err(e) => {
                self.mark_task_failed(&task, classify_error(&e)).await;
                self.recycle_task(id).await;
            }
        }
    }

    /// Mark a task failed in memory and in the database, and announce it
    async fn mark_task_failed(&self, task: &DownloadTask, message: String) {
        let id = task.episode_id();
        tracing::warn!(episode_id = id.0, error = %message, "Download failed");

        task.fail(message.clone());
        task.set_speed_bps(0);

        if let Err(e) = self.db.set_download_status(id, Status::Failed.to_i32()).await {
            tracing::error!(episode_id = id.0, error = %e, "Failed to persist Failed status");
        }
        if let Err(e) = self.db.set_download_error(id, &message).await {
            tracing::error!(episode_id = id.0, error = %e, "Failed to persist error message");
        }

        self.emit_event(Event::DownloadFailed { id, error: message });
    }

    /// Prepare the target directory and run the fetch with retry
    async fn execute_download(&self, task: &Arc<DownloadTask>) -> Result<FetchOutcome> {
        tokio::fs::create_dir_all(task.target_dir()).await?;

        // Refuse to start when the disk is nearly full; a check failure is
        // only logged (downloads on exotic filesystems still work)
        let required = task.total_size() + self.config.download.min_free_space_bytes;
        match utils::get_available_space(task.target_dir()) {
            Ok(available) if available < required => {
                return Err(Error::Download(DownloadError::InsufficientSpace {
                    required,
                    available,
                }));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Could not check free disk space");
            }
        }

        with_retry(&self.config.retry, || self.fetch_once(task)).await
    }

    /// One HTTP fetch attempt with range resume.
    ///
    /// Pause/cancel is cooperative: the task status is checked once per
    /// received chunk, so a task blocked in a long read observes the
    /// request only when the next chunk arrives.
    async fn fetch_once(&self, task: &Arc<DownloadTask>) -> Result<FetchOutcome> {
        let id = task.episode_id();

        // A pause or cancel issued between attempts lands here
        match task.status() {
            Status::Paused => return Ok(FetchOutcome::Paused),
            Status::Cancelled => {
                self.remove_partial(task).await;
                return Ok(FetchOutcome::Cancelled);
            }
            _ => {}
        }

        // Indirect media URLs are re-resolved on every attempt so
        // short-lived signed URLs stay fresh across retries
        let resolved = self.resolver.resolve(task.url()).await?;

        let partial_path = task.partial_path();
        let resume_from = match tokio::fs::metadata(&partial_path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let mut request = self.http.get(&resolved);
        if resume_from > 0 {
            request = request.header(reqwest::header::RANGE, format!("bytes={resume_from}-"));
            tracing::debug!(episode_id = id.0, resume_from, "Resuming partial download");
        }

        let response = request.send().await.map_err(Error::Network)?;
        let status = response.status().as_u16();

        if !(200..300).contains(&status) {
            // Retryable statuses bubble up as HttpStatus and the retry
            // layer decides; everything else fails the task immediately
            return Err(Error::Download(DownloadError::HttpStatus {
                url: resolved.clone(),
                status,
            }));
        }

        // Verify the server actually honored the resume. Anything other
        // than a 206 whose Content-Range starts at our offset means we
        // must truncate and start over.
        let resume_honored = resume_from > 0
            && status == 206
            && response
                .headers()
                .get(reqwest::header::CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range)
                .is_some_and(|(start, _)| start == resume_from);

        let start_offset = if resume_honored { resume_from } else { 0 };
        if resume_from > 0 && !resume_honored {
            tracing::info!(
                episode_id = id.0,
                status,
                "Server ignored resume request, restarting from offset 0"
            );
        }

        // Total size: from Content-Range on a resume, else Content-Length
        let expected_total = if resume_honored {
            response
                .headers()
                .get(reqwest::header::CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range)
                .and_then(|(_, total)| total)
                .or_else(|| response.content_length().map(|len| start_offset + len))
        } else {
            response.content_length()
        };

        if let Some(total) = expected_total
            && total > 0
            && total != task.total_size()
        {
            // The feed lied about the enclosure size; believe the server
            task.set_total_size(total);
            if let Err(e) = self.db.set_file_size(id, total as i64).await {
                tracing::warn!(episode_id = id.0, error = %e, "Failed to correct episode size");
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

        let disposition_name = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(utils::filename_from_content_disposition);

        let redirect_name = {
            let final_url = response.url().clone();
            if final_url.as_str() != resolved {
                utils::filename_from_url(&final_url)
            } else {
                None
            }
        };

        let mut file = if resume_honored {
            tokio::fs::OpenOptions::new()
                .append(true)
                .open(&partial_path)
                .await
        } else {
            tokio::fs::File::create(&partial_path).await
        }
        .map_err(|e| {
            Error::Download(DownloadError::WriteFailed {
                path: partial_path.clone(),
                reason: e.to_string(),
            })
        })?;

        let mut written = start_offset;
        let mut window_start = Instant::now();
        let mut window_bytes = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(Error::Network)?;

            // The only cancellation points: once per chunk
            match task.status() {
                Status::Cancelled => {
                    drop(file);
                    self.remove_partial(task).await;
                    return Ok(FetchOutcome::Cancelled);
                }
                Status::Paused => {
                    file.flush().await.ok();
                    return Ok(FetchOutcome::Paused);
                }
                _ => {}
            }

            // Global bandwidth limit; re-reads the live limit per call
            self.speed_limiter.acquire(chunk.len() as u64).await;

            file.write_all(&chunk).await.map_err(|e| {
                Error::Download(DownloadError::WriteFailed {
                    path: partial_path.clone(),
                    reason: e.to_string(),
                })
            })?;

            written += chunk.len() as u64;
            window_bytes += chunk.len() as u64;

            let total = task.total_size();
            if total > 0 {
                task.set_progress(written as f32 / total as f32);
            }

            let elapsed = window_start.elapsed();
            if elapsed >= PROGRESS_INTERVAL {
                let speed = (window_bytes as f64 / elapsed.as_secs_f64()) as u64;
                task.set_speed_bps(speed);
                self.emit_event(Event::Downloading {
                    id,
                    progress: task.progress(),
                    speed_bps: speed,
                });
                window_start = Instant::now();
                window_bytes = 0;
            }
        }

        file.flush().await.map_err(|e| {
            Error::Download(DownloadError::WriteFailed {
                path: partial_path.clone(),
                reason: e.to_string(),
            })
        })?;
        drop(file);

        // A body shorter than advertised means the connection dropped;
        // the partial file stays so the retry can resume
        if let Some(expected) = expected_total
            && written < expected
        {
            return Err(Error::Download(DownloadError::ContentTooShort {
                received: written,
                expected,
            }));
        }

        Ok(FetchOutcome::Completed(CompletedFetch {
            content_type,
            disposition_name,
            redirect_name,
            bytes_on_disk: written,
        }))
    }

    /// Rename the finished partial into place and persist completion.
    ///
    /// Only transitions to `Done` if the task is still `Downloading`; a
    /// pause or cancel that raced the final chunk wins instead.
    async fn finish_download(&self, task: &Arc<DownloadTask>, done: CompletedFetch) -> Result<()> {
        let id = task.episode_id();

        match task.status() {
            Status::Downloading => {}
            Status::Cancelled => {
                self.remove_partial(task).await;
                self.db
                    .set_download_status(id, Status::Cancelled.to_i32())
                    .await?;
                self.emit_event(Event::DownloadCancelled { id });
                self.recycle_task(id).await;
                return Ok(());
            }
            _ => {
                // Paused at the last moment: keep the partial for resume
                self.db.set_download_status(id, Status::Paused.to_i32()).await?;
                self.emit_event(Event::DownloadPaused { id });
                return Ok(());
            }
        }

        // Server-provided names beat URL-derived ones; a junk extension is
        // replaced when the mimetype or redirect target implies a better one
        let current = task.filename();
        if let Some(better) = improved_filename(
            &current,
            done.disposition_name.as_deref(),
            done.content_type.as_deref(),
            done.redirect_name.as_deref(),
        ) && better != current
        {
            tracing::info!(episode_id = id.0, from = %current, to = %better, "Renaming download");
            task.set_filename(better);
        }

        let partial_path = task
            .target_dir()
            .join(format!("{current}{}", super::PARTIAL_SUFFIX));
        let final_path = utils::get_unique_path(&task.target_path());
        if let Some(name) = final_path.file_name().and_then(|n| n.to_str()) {
            task.set_filename(name.to_string());
        }

        tokio::fs::rename(&partial_path, &final_path).await?;

        self.db
            .set_episode_downloaded(
                id,
                &task.filename(),
                done.bytes_on_disk as i64,
                done.content_type.as_deref(),
            )
            .await?;

        task.set_progress(1.0);
        task.set_speed_bps(0);
        task.set_status(Status::Done);

        self.emit_event(Event::DownloadComplete { id });
        self.emit_event(Event::EpisodeDownloaded {
            id,
            path: final_path.clone(),
        });

        // Record the download for the web service and nudge the flush worker
        if self.config.sync.enabled {
            self.record_download_action(id).await;
            if let Some(sync) = &self.sync {
                sync.flush(false);
            }
        }

        tracing::info!(episode_id = id.0, path = %final_path.display(), "Download complete");

        self.recycle_task(id).await;
        Ok(())
    }

    /// Queue a "download" episode action for the sync service
    async fn record_download_action(&self, id: crate::types::EpisodeId) {
        let result: Result<()> = async {
            let episode = self
                .db
                .get_episode(id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Episode {id} not found")))?;
            let podcast = self
                .db
                .get_podcast(PodcastId(episode.podcast_id))
                .await?
                .ok_or_else(|| {
                    Error::NotFound(format!("Podcast {} not found", episode.podcast_id))
                })?;

            self.db
                .enqueue_episode_action(&crate::db::NewEpisodeAction {
                    podcast_url: &podcast.url,
                    episode_url: &episode.url,
                    kind: EpisodeActionKind::Download.to_i32(),
                    started: None,
                    position: None,
                    total: None,
                    timestamp: chrono::Utc::now().timestamp(),
                })
                .await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(episode_id = id.0, error = %e, "Failed to record download action");
        }
    }

    /// Delete the partial file, logging (not failing) on error
    async fn remove_partial(&self, task: &DownloadTask) {
        let path = task.partial_path();
        if let Err(e) = tokio::fs::remove_file(&path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %path.display(), error = %e, "Failed to delete partial file");
        }
    }

    /// Delete an episode's downloaded file, mark it deleted, and record
    /// the action for the sync service.
    pub async fn delete_episode_file(&self, id: crate::types::EpisodeId) -> Result<()> {
        let episode = self
            .db
            .get_episode(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Episode {id} not found")))?;
        let podcast = self
            .db
            .get_podcast(PodcastId(episode.podcast_id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("Podcast {} not found", episode.podcast_id)))?;

        let path = self
            .config
            .download
            .download_dir
            .join(utils::sanitize_media_filename(&podcast.title))
            .join(&episode.download_filename);
        if let Err(e) = tokio::fs::remove_file(&path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            return Err(Error::Io(e));
        }

        self.db
            .set_episode_state(id, EpisodeState::Deleted.to_i32())
            .await?;

        if self.config.sync.enabled {
            self.db
                .enqueue_episode_action(&crate::db::NewEpisodeAction {
                    podcast_url: &podcast.url,
                    episode_url: &episode.url,
                    kind: EpisodeActionKind::Delete.to_i32(),
                    started: None,
                    position: None,
                    total: None,
                    timestamp: chrono::Utc::now().timestamp(),
                })
                .await?;
            if let Some(sync) = &self.sync {
                sync.flush(false);
            }
        }

        Ok(())
    }

    /// Record playback progress: persists the position locally and queues
    /// a "play" action for the sync service.
    pub async fn mark_played(
        &self,
        id: crate::types::EpisodeId,
        started: i64,
        position: i64,
        total: Option<i64>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let episode = self
            .db
            .get_episode(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Episode {id} not found")))?;

        self.db.update_position(id, position, total, now).await?;

        if self.config.sync.enabled {
            let podcast = self
                .db
                .get_podcast(PodcastId(episode.podcast_id))
                .await?
                .ok_or_else(|| {
                    Error::NotFound(format!("Podcast {} not found", episode.podcast_id))
                })?;

            self.db
                .enqueue_episode_action(&crate::db::NewEpisodeAction {
                    podcast_url: &podcast.url,
                    episode_url: &episode.url,
                    kind: EpisodeActionKind::Play.to_i32(),
                    started: Some(started),
                    position: Some(position),
                    total,
                    timestamp: now,
                })
                .await?;
            if let Some(sync) = &self.sync {
                sync.flush(false);
            }
        }

        Ok(())
    }
}

/// Human-readable failure message, classified by error type
fn classify_error(error: &Error) -> String {
    match error {
        Error::Io(e) => format!("I/O error: {e}"),
        Error::Download(DownloadError::HttpStatus { status, .. }) => {
            if RETRYABLE_HTTP_STATUSES.contains(status) {
                format!("HTTP error {status} (gave up after retries)")
            } else {
                format!("HTTP error {status}")
            }
        }
        Error::Download(DownloadError::ContentTooShort { received, expected }) => {
            format!("Missing content from server: received {received} of {expected} bytes")
        }
        Error::Download(DownloadError::WriteFailed { path, reason }) => {
            format!("I/O error writing {}: {reason}", path.display())
        }
        Error::Network(e) => format!("HTTP request failed: {e}"),
        other => other.to_string(),
    }
}

/// Parse a Content-Range header value "bytes start-end/total".
///
/// Returns (start, total); total is None for "bytes start-end/*".
fn parse_content_range(value: &str) -> Option<(u64, Option<u64>)> {
    let rest = value.trim().strip_prefix("bytes ")?;
    let (range, total) = rest.split_once('/')?;
    let (start, _end) = range.split_once('-')?;
    let start = start.trim().parse::<u64>().ok()?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse::<u64>().ok()?),
    };
    Some((start, total))
}

/// Decide whether the finished file should be stored under a better name.
///
/// A `Content-Disposition` filename always wins. Otherwise the current
/// extension is only replaced when it is junk (empty, overlong, spaces,
/// non-alphanumeric) and the server mimetype or the redirect target's
/// basename supplies a usable one.
fn improved_filename(
    current: &str,
    disposition: Option<&str>,
    content_type: Option<&str>,
    redirect_name: Option<&str>,
) -> Option<String> {
    if let Some(name) = disposition {
        let name = utils::sanitize_media_filename(name);
        if name != current {
            return Some(name);
        }
        return None;
    }

    let current_ext = Path::new(current)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    if !utils::is_junk_extension(current_ext) {
        return None;
    }

    let better = content_type
        .and_then(utils::extension_for_mimetype)
        .map(str::to_string)
        .or_else(|| {
            redirect_name
                .and_then(|n| Path::new(n).extension().and_then(|e| e.to_str()))
                .filter(|e| !utils::is_junk_extension(e))
                .map(str::to_string)
        })?;

    let stem = Path::new(current)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(current);
    Some(format!("{stem}.{better}"))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod unit_tests {
    use super::*;

    // --- parse_content_range ---

    #[test]
    fn content_range_parses_start_and_total() {
        assert_eq!(
            parse_content_range("bytes 400-999/1000"),
            Some((400, Some(1000)))
        );
    }

    #[test]
    fn content_range_with_unknown_total() {
        assert_eq!(parse_content_range("bytes 10-99/*"), Some((10, None)));
    }

    #[test]
    fn content_range_rejects_malformed_values() {
        assert_eq!(parse_content_range("bytes"), None);
        assert_eq!(parse_content_range("bytes x-999/1000"), None);
        assert_eq!(parse_content_range("items 400-999/1000"), None);
        assert_eq!(parse_content_range(""), None);
    }

    // --- improved_filename ---

    #[test]
    fn disposition_filename_takes_precedence() {
        let better = improved_filename(
            "Episode 1.mp3",
            Some("real-name.m4a"),
            Some("audio/mpeg"),
            None,
        );
        assert_eq!(better.as_deref(), Some("real-name.m4a"));
    }

    #[test]
    fn disposition_equal_to_current_changes_nothing() {
        assert!(
            improved_filename("Episode 1.mp3", Some("Episode 1.mp3"), None, None).is_none()
        );
    }

    #[test]
    fn sane_extension_is_left_alone() {
        assert!(
            improved_filename("Episode 1.mp3", None, Some("audio/mp4"), None).is_none(),
            "a good extension is never replaced by mimetype guessing"
        );
    }

    #[test]
    fn junk_extension_replaced_from_mimetype() {
        let better = improved_filename("watchv=abc123", None, Some("video/mp4"), None);
        assert_eq!(better.as_deref(), Some("watchv=abc123.mp4"));
    }

    #[test]
    fn junk_extension_replaced_from_redirect_basename() {
        let better = improved_filename("episode", None, None, Some("cdn-file.mp3"));
        assert_eq!(better.as_deref(), Some("episode.mp3"));
    }

    #[test]
    fn mimetype_beats_redirect_for_extension() {
        let better = improved_filename("episode", None, Some("audio/ogg"), Some("cdn-file.mp3"));
        assert_eq!(better.as_deref(), Some("episode.ogg"));
    }

    #[test]
    fn junk_extension_with_no_better_candidate_is_kept() {
        assert!(improved_filename("episode", None, Some("text/html"), None).is_none());
    }

    // --- classify_error ---

    #[test]
    fn http_errors_carry_their_status_code() {
        let msg = classify_error(&Error::Download(DownloadError::HttpStatus {
            url: "http://example.com/e.mp3".into(),
            status: 404,
        }));
        assert!(msg.contains("404"), "got: {msg}");
    }

    #[test]
    fn content_too_short_mentions_byte_counts() {
        let msg = classify_error(&Error::Download(DownloadError::ContentTooShort {
            received: 400,
            expected: 1000,
        }));
        assert!(msg.contains("400") && msg.contains("1000"), "got: {msg}");
    }

    #[test]
    fn io_errors_are_prefixed() {
        let msg = classify_error(&Error::Io(std::io::Error::other("disk on fire")));
        assert!(msg.starts_with("I/O error"), "got: {msg}");
    }
}
