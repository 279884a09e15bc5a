//! Core downloader implementation split into focused submodules.
//!
//! The `PodcastDownloader` struct and its methods are organized by domain:
//! - [`queue`] - Download queue management and startup restore
//! - [`worker`] - Queue worker loops and the concurrency gate
//! - [`control`] - Download lifecycle control (pause/resume/cancel)
//! - [`feeds`] - Subscription management and feed updates
//! - [`fetch`] - HTTP download execution with range resume
//! - [`task`] - Per-episode task state machine handle
//! - [`lifecycle`] - Startup and shutdown coordination

mod control;
mod feeds;
mod fetch;
mod lifecycle;
mod queue;
mod task;
mod worker;

pub use task::{DownloadTask, PARTIAL_SUFFIX};

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64};

use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::resolver::{PassthroughResolver, UrlResolver};
use crate::speed_limiter::SpeedLimiter;
use crate::sync::SyncManager;
use crate::sync::client::HttpGpodderClient;
use crate::types::{DownloadInfo, EpisodeId, Event, QueueStats, Status};

/// Queue and task state management
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Pending task deque. Workers pop from the tail; normal adds push to
    /// the head (FIFO) and force-started adds push to the tail so they are
    /// picked up next.
    pub(crate) queue: Arc<tokio::sync::Mutex<VecDeque<Arc<DownloadTask>>>>,
    /// Live tasks by episode (queued, downloading, or paused). At most one
    /// task exists per episode; terminal tasks are removed.
    pub(crate) tasks: Arc<tokio::sync::Mutex<HashMap<EpisodeId, Arc<DownloadTask>>>>,
    /// Active worker loop ids. The length of this list is the soft
    /// concurrency gate.
    pub(crate) workers: Arc<tokio::sync::Mutex<Vec<u64>>>,
    /// Worker id allocator
    pub(crate) next_worker_id: Arc<AtomicU64>,
    /// Flag to indicate whether new downloads are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl QueueState {
    fn new() -> Self {
        Self {
            queue: Arc::new(tokio::sync::Mutex::new(VecDeque::new())),
            tasks: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            workers: Arc::new(tokio::sync::Mutex::new(Vec::new())),
            next_worker_id: Arc::new(AtomicU64::new(1)),
            accepting_new: Arc::new(AtomicBool::new(true)),
        }
    }
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct PodcastDownloader {
    /// Database instance for persistence (wrapped in Arc for sharing across tasks)
    /// Public for integration tests and embedding applications
    pub db: Arc<Database>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Shared HTTP client for episode downloads and feed fetches
    pub(crate) http: reqwest::Client,
    /// Global speed limiter shared across all downloads (token bucket)
    pub(crate) speed_limiter: SpeedLimiter,
    /// Media URL resolver applied before every fetch attempt
    pub(crate) resolver: Arc<dyn UrlResolver>,
    /// Queue and task state
    pub(crate) queue_state: QueueState,
    /// Web service sync manager, present when sync is configured
    pub(crate) sync: Option<Arc<SyncManager>>,
    /// Cancelled on shutdown; background loops watch this token
    pub(crate) shutdown_token: tokio_util::sync::CancellationToken,
}

impl PodcastDownloader {
    /// Create a new PodcastDownloader instance
    ///
    /// This initializes all core components:
    /// - Creates the download directory
    /// - Opens/creates the SQLite database and runs migrations
    /// - Sets up the event broadcast channel and HTTP client
    /// - Re-queues downloads interrupted by the previous session
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_resolver(config, Arc::new(PassthroughResolver)).await
    }

    /// Create a PodcastDownloader with a custom media URL resolver
    pub async fn with_resolver(config: Config, resolver: Arc<dyn UrlResolver>) -> Result<Self> {
        tokio::fs::create_dir_all(&config.download.download_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download.download_dir.display(),
                        e
                    ),
                ))
            })?;

        // Initialize database
        let db = Database::new(&config.persistence.database_path).await?;

        if db.was_unclean_shutdown().await? {
            tracing::warn!("Previous session did not shut down cleanly");
        }

        // Mark that we're starting up (for unclean shutdown detection)
        db.set_clean_start().await?;

        // Create broadcast channel with buffer size of 1000 events.
        // Multiple subscribers receive all events independently.
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        // One HTTP client for downloads, feeds, and cover art. No global
        // request timeout: large episode downloads legitimately run for a
        // long time. Connect problems still fail fast.
        let http = reqwest::Client::builder()
            .user_agent(concat!("podcast-dl/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(Error::Network)?;

        let speed_limiter = SpeedLimiter::new(config.download.speed_limit_bps);
        let config_arc = Arc::new(config);
        let db_arc = Arc::new(db);

        let sync = if config_arc.sync.enabled {
            let client = Arc::new(HttpGpodderClient::new(&config_arc.sync)?);
            Some(Arc::new(SyncManager::new(
                db_arc.clone(),
                client,
                config_arc.clone(),
                event_tx.clone(),
            )))
        } else {
            None
        };

        let downloader = Self {
            db: db_arc,
            event_tx,
            config: config_arc,
            http,
            speed_limiter,
            resolver,
            queue_state: QueueState::new(),
            sync,
            shutdown_token: tokio_util::sync::CancellationToken::new(),
        };

        // Re-queue downloads interrupted by the previous session; the
        // partial files on disk let them resume where they stopped
        downloader.restore_queue().await?;

        Ok(downloader)
    }

    /// Subscribe to downloader events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all
    /// events independently. Events are buffered, but a subscriber that
    /// falls behind by more than 1000 events receives a
    /// `RecvError::Lagged` error.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// The sync manager, when sync is configured
    pub fn sync_manager(&self) -> Option<Arc<SyncManager>> {
        self.sync.clone()
    }

    /// Change the global download speed limit (None = unlimited).
    ///
    /// Takes effect immediately, including for downloads already in
    /// flight.
    pub fn set_speed_limit(&self, limit_bps: Option<u64>) {
        self.speed_limiter.set_limit(limit_bps);
        self.emit_event(Event::SpeedLimitChanged { limit_bps });
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers the event is silently dropped;
    /// downloads proceed whether or not anyone is listening.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Snapshot of one live download task
    fn download_info(task: &DownloadTask) -> DownloadInfo {
        DownloadInfo {
            id: task.episode_id(),
            title: task.title().to_string(),
            status: task.status(),
            progress: task.progress(),
            speed_bps: task.speed_bps(),
            total_size: task.total_size(),
            error_message: task.error_message(),
        }
    }

    /// List all live download tasks (queued, downloading, and paused)
    pub async fn list_downloads(&self) -> Vec<DownloadInfo> {
        let tasks = self.queue_state.tasks.lock().await;
        let mut infos: Vec<DownloadInfo> = tasks.values().map(|t| Self::download_info(t)).collect();
        infos.sort_by_key(|i| i.id);
        infos
    }

    /// Queue statistics snapshot
    pub async fn queue_stats(&self) -> QueueStats {
        let tasks = self.queue_state.tasks.lock().await;
        let mut queued = 0;
        let mut downloading = 0;
        let mut paused = 0;
        let mut total_speed = 0u64;

        for task in tasks.values() {
            match task.status() {
                Status::Queued => queued += 1,
                Status::Downloading => {
                    downloading += 1;
                    total_speed += task.speed_bps();
                }
                Status::Paused => paused += 1,
                _ => {}
            }
        }
        drop(tasks);

        QueueStats {
            queued,
            downloading,
            paused,
            workers: self.queue_state.workers.lock().await.len(),
            total_speed_bps: total_speed,
            speed_limit_bps: self.speed_limiter.get_limit(),
            accepting_new: self
                .queue_state
                .accepting_new
                .load(std::sync::atomic::Ordering::SeqCst),
        }
    }
}
