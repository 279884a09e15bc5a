//! Web service synchronization: durable offline action queues and the
//! background flush worker.
//!
//! Local mutations (subscribe/unsubscribe, episode play/download/delete)
//! are queued in the database as they happen. A flush uploads them and
//! pulls the other devices' changes, keyed by per-(host, device, category)
//! watermarks. Sync is best-effort background behavior: failures are
//! logged and retried on the next flush, except authentication failures,
//! which disable sync persistently instead of retrying forever.

pub mod client;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::Config;
use crate::db::Database;
use crate::db::NewEpisodeAction;
use crate::error::{Error, Result, SyncError};
use crate::retry::IsRetryable;
use crate::types::{EpisodeActionKind, EpisodeId, EpisodeState, Event, SubscribeKind};

use client::{GpodderClient, WireEpisodeAction, epoch_to_wire_time, wire_time_to_epoch};

/// Counts from one completed flush cycle
#[derive(Clone, Copy, Debug, Default)]
pub struct CycleStats {
    /// Episode actions uploaded to the server
    pub uploaded_actions: usize,
    /// Episode actions received from the server
    pub received_actions: usize,
}

/// Coordinates the offline action queues with the web service
pub struct SyncManager {
    db: Arc<Database>,
    client: Arc<dyn GpodderClient>,
    config: Arc<Config>,
    event_tx: tokio::sync::broadcast::Sender<Event>,
    /// True while a flush worker is scheduled or running; concurrent
    /// flush requests coalesce into it
    worker_running: Arc<AtomicBool>,
    /// Wakes a debouncing worker early when a forced flush arrives
    flush_now: Arc<tokio::sync::Notify>,
}

impl SyncManager {
    /// Create a sync manager over a database and an API client
    pub fn new(
        db: Arc<Database>,
        client: Arc<dyn GpodderClient>,
        config: Arc<Config>,
        event_tx: tokio::sync::broadcast::Sender<Event>,
    ) -> Self {
        Self {
            db,
            client,
            config,
            event_tx,
            worker_running: Arc::new(AtomicBool::new(false)),
            flush_now: Arc::new(tokio::sync::Notify::new()),
        }
    }

    /// Watermark key for this server/device and a category
    /// ("subscriptions" or "episodes")
    fn since_key(&self, category: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.sync.server, self.config.sync.device_id, category
        )
    }

    /// Whether sync should run at all: configured on and not persistently
    /// disabled by an earlier authentication failure
    pub async fn enabled(&self) -> bool {
        if !self.config.sync.enabled {
            return false;
        }
        match self.db.is_sync_disabled().await {
            Ok(disabled) => !disabled,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read sync disable flag");
                false
            }
        }
    }

    /// Request a flush of the offline queues.
    ///
    /// The worker debounces for `flush_timeout` so bursts of actions
    /// upload in one batch; `now` skips the debounce. While a worker is
    /// scheduled, further requests coalesce into it (a forced request
    /// wakes the debouncing worker early).
    pub fn flush(self: &Arc<Self>, now: bool) {
        if self.worker_running.swap(true, Ordering::SeqCst) {
            if now {
                self.flush_now.notify_one();
            }
            return;
        }

        let manager = self.clone();
        tokio::spawn(async move {
            if !now {
                tokio::select! {
                    _ = tokio::time::sleep(manager.config.sync.flush_timeout) => {}
                    _ = manager.flush_now.notified() => {}
                }
            }

            manager.run_flush().await;
            manager.worker_running.store(false, Ordering::SeqCst);
        });
    }

    /// Flag the device settings for (re-)upload on the next flush
    pub async fn request_device_update(self: &Arc<Self>) -> Result<()> {
        self.db.set_device_update_pending(true).await?;
        self.flush(false);
        Ok(())
    }

    /// Run the flush cycle, retrying retryable failures a bounded number
    /// of times. Called by the worker; public for explicit synchronous
    /// flushes in embedding applications and tests.
    pub async fn run_flush(&self) {
        if !self.enabled().await {
            tracing::debug!("Sync disabled, skipping flush");
            return;
        }

        let max_attempts = self.config.sync.max_sync_retries.max(1);

        for attempt in 1..=max_attempts {
            match self.run_cycle().await {
                Ok(stats) => {
                    // Merge the freshly received actions into local state
                    if let Err(e) = self.process_episode_actions().await {
                        tracing::warn!(error = %e, "Failed to merge received episode actions");
                    }
                    self.event_tx
                        .send(Event::SyncCompleted {
                            uploaded_actions: stats.uploaded_actions,
                            received_actions: stats.received_actions,
                        })
                        .ok();
                    return;
                }
                Err(Error::Sync(SyncError::Unauthorized { server })) => {
                    tracing::error!(server = %server, "Sync credentials rejected, disabling sync");
                    if let Err(e) = self.db.set_sync_disabled(true).await {
                        tracing::error!(error = %e, "Failed to persist sync disable flag");
                    }
                    self.event_tx
                        .send(Event::SyncDisabled {
                            reason: format!("authentication rejected by {server}"),
                        })
                        .ok();
                    return;
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(
                        error = %e,
                        attempt,
                        max_attempts,
                        "Sync cycle failed, retrying"
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
                Err(e) => {
                    // Best-effort: give up until the next scheduled flush
                    tracing::error!(error = %e, "Sync cycle failed");
                    return;
                }
            }
        }
    }

    /// One full sync cycle, in the order the server requires:
    ///
    /// 1. Upload pending device settings (the device must exist before
    ///    other calls reference it)
    /// 2. Pull server-side subscription changes since the watermark
    /// 3. Push locally queued subscription changes in one batch
    /// 4. Download remote episode actions since the watermark
    /// 5. Upload locally queued episode actions in bounded batches,
    ///    deleting each batch only after its upload succeeded
    pub async fn run_cycle(&self) -> Result<CycleStats> {
        let mut stats = CycleStats::default();
        let device_id = &self.config.sync.device_id;
        let subscriptions_key = self.since_key("subscriptions");
        let episodes_key = self.since_key("episodes");

        // Step 1: device settings. Also done on the very first cycle so
        // the device exists before anything references it.
        let first_cycle = self.db.get_since(&subscriptions_key).await?.is_none();
        if first_cycle || self.db.is_device_update_pending().await? {
            self.client
                .update_device_settings(
                    device_id,
                    &self.config.sync.device_caption,
                    &self.config.sync.device_type,
                )
                .await
                .map_err(Error::Sync)?;
            self.db.set_device_update_pending(false).await?;
            tracing::debug!("Uploaded device settings");
        }

        // Step 2: pull server-side subscription changes
        let since = self.db.get_since(&subscriptions_key).await?;
        let changes = self
            .client
            .pull_subscriptions(device_id, since)
            .await
            .map_err(Error::Sync)?;

        for url in &changes.add {
            // Already subscribed locally: nothing for the UI to confirm
            if self.db.get_podcast_by_url(url).await?.is_none() {
                self.db
                    .record_received_subscribe(url, SubscribeKind::Add.to_i32(), changes.timestamp)
                    .await?;
            }
        }
        for url in &changes.remove {
            if self.db.get_podcast_by_url(url).await?.is_some() {
                self.db
                    .record_received_subscribe(
                        url,
                        SubscribeKind::Remove.to_i32(),
                        changes.timestamp,
                    )
                    .await?;
            }
        }
        self.db.set_since(&subscriptions_key, changes.timestamp).await?;

        // Step 3: push locally queued subscription changes
        let queued = self.db.list_subscribe_actions().await?;
        if !queued.is_empty() {
            let add: Vec<String> = queued
                .iter()
                .filter(|a| SubscribeKind::from_i32(a.kind) == SubscribeKind::Add)
                .map(|a| a.url.clone())
                .collect();
            let remove: Vec<String> = queued
                .iter()
                .filter(|a| SubscribeKind::from_i32(a.kind) == SubscribeKind::Remove)
                .map(|a| a.url.clone())
                .collect();

            let result = self
                .client
                .update_subscriptions(device_id, &add, &remove)
                .await
                .map_err(Error::Sync)?;

            let ids: Vec<i64> = queued.iter().map(|a| a.id).collect();
            self.db.delete_subscribe_actions(&ids).await?;
            self.db.set_since(&subscriptions_key, result.timestamp).await?;

            // URL-rewrite hints are recorded for the consumer to apply,
            // not applied blindly
            for (old_url, new_url) in result.update_urls {
                if old_url != new_url && !new_url.is_empty() {
                    self.db.record_rewritten_url(&old_url, &new_url).await?;
                    self.event_tx
                        .send(Event::SubscriptionRewritten { old_url, new_url })
                        .ok();
                }
            }
        }

        // Step 4: download remote episode actions
        let since = self.db.get_since(&episodes_key).await?;
        let remote = self
            .client
            .download_episode_actions(since)
            .await
            .map_err(Error::Sync)?;

        for action in &remote.actions {
            self.db
                .record_received_episode_action(&NewEpisodeAction {
                    podcast_url: &action.podcast,
                    episode_url: &action.episode,
                    kind: EpisodeActionKind::from_wire(&action.action).to_i32(),
                    started: action.started,
                    position: action.position,
                    total: action.total,
                    timestamp: wire_time_to_epoch(&action.timestamp),
                })
                .await?;
        }
        stats.received_actions = remote.actions.len();
        self.db.set_since(&episodes_key, remote.timestamp).await?;

        // Step 5: upload queued episode actions in batches. Each batch is
        // deleted only after its upload succeeded, so a crash mid-flush
        // loses no actions.
        let batch_size = self.config.sync.action_batch_size.max(1);
        loop {
            let batch = self.db.list_episode_actions(batch_size).await?;
            if batch.is_empty() {
                break;
            }

            let wire: Vec<WireEpisodeAction> = batch
                .iter()
                .map(|a| WireEpisodeAction {
                    podcast: a.podcast_url.clone(),
                    episode: a.episode_url.clone(),
                    device: Some(device_id.clone()),
                    action: EpisodeActionKind::from_i32(a.kind).as_wire().to_string(),
                    timestamp: epoch_to_wire_time(a.timestamp),
                    started: a.started,
                    position: a.position,
                    total: a.total,
                })
                .collect();

            let timestamp = self
                .client
                .upload_episode_actions(&wire)
                .await
                .map_err(Error::Sync)?;

            let ids: Vec<i64> = batch.iter().map(|a| a.id).collect();
            self.db.delete_episode_actions(&ids).await?;
            self.db.set_since(&episodes_key, timestamp).await?;
            stats.uploaded_actions += batch.len();

            if batch.len() < batch_size {
                break;
            }
        }

        tracing::info!(
            uploaded = stats.uploaded_actions,
            received = stats.received_actions,
            "Sync cycle complete"
        );

        Ok(stats)
    }

    /// Merge received episode actions into local episode state, consuming
    /// the received queue.
    ///
    /// A "play" action updates the stored playback position only when its
    /// remote timestamp is newer than the episode's last local change —
    /// last-writer-wins by timestamp, independent of arrival order. A
    /// "delete" is honored only when the episode is not currently
    /// downloaded with its file still on disk. Other kinds are ignored.
    ///
    /// Returns the number of actions that changed local state.
    pub async fn process_episode_actions(&self) -> Result<usize> {
        let actions = self.db.list_received_episode_actions().await?;
        if actions.is_empty() {
            return Ok(0);
        }

        let mut applied = 0usize;
        let mut consumed = Vec::with_capacity(actions.len());

        for action in actions {
            consumed.push(action.id);

            let Some(episode) = self
                .db
                .get_episode_by_urls(&action.podcast_url, &action.episode_url)
                .await?
            else {
                // Unknown episode (podcast not subscribed here); drop it
                continue;
            };

            match EpisodeActionKind::from_i32(action.kind) {
                EpisodeActionKind::Play => {
                    let Some(position) = action.position else {
                        continue;
                    };
                    if action.timestamp > episode.current_position_updated {
                        self.db
                            .update_position(
                                EpisodeId(episode.id),
                                position,
                                action.total,
                                action.timestamp,
                            )
                            .await?;
                        applied += 1;
                    }
                }
                EpisodeActionKind::Delete => {
                    if self.episode_file_present(&episode).await? {
                        // The user still has the file locally; a remote
                        // delete must not pull it out from under them
                        continue;
                    }
                    self.db
                        .set_episode_state(EpisodeId(episode.id), EpisodeState::Deleted.to_i32())
                        .await?;
                    applied += 1;
                }
                // Download/new actions from other devices don't change
                // local state
                _ => {}
            }
        }

        self.db.delete_received_episode_actions(&consumed).await?;
        Ok(applied)
    }

    /// Whether the episode is downloaded with its file still on disk
    async fn episode_file_present(&self, episode: &crate::db::Episode) -> Result<bool> {
        if episode.state != EpisodeState::Downloaded.to_i32() {
            return Ok(false);
        }
        let podcast = self
            .db
            .get_podcast(crate::types::PodcastId(episode.podcast_id))
            .await?;
        let Some(podcast) = podcast else {
            return Ok(false);
        };
        let path = self
            .config
            .download
            .download_dir
            .join(crate::utils::sanitize_media_filename(&podcast.title))
            .join(&episode.download_filename);
        Ok(tokio::fs::try_exists(&path).await.unwrap_or(false))
    }
}
