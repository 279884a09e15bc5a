//! Background feed refresh scheduling.
//!
//! The scheduler periodically refreshes enabled podcasts. Each podcast
//! tracks its last check time in the database, so refreshes survive
//! restarts and podcasts added at runtime are picked up automatically.
//!
//! # Example
//!
//! ```no_run
//! use podcast_dl::{Config, PodcastDownloader};
//! use podcast_dl::feed_scheduler::FeedScheduler;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = Arc::new(PodcastDownloader::new(Config::default()).await?);
//! let scheduler = FeedScheduler::new(downloader.clone());
//!
//! tokio::spawn(async move {
//!     scheduler.run().await;
//! });
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};

use crate::PodcastDownloader;
use crate::types::PodcastId;

/// Interval between scheduler wake-ups. Each wake-up refreshes the
/// podcasts whose check interval has elapsed.
const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Periodically refreshes enabled podcast feeds
pub struct FeedScheduler {
    downloader: Arc<PodcastDownloader>,
}

impl FeedScheduler {
    /// Create a scheduler bound to a downloader instance
    pub fn new(downloader: Arc<PodcastDownloader>) -> Self {
        Self { downloader }
    }

    /// Run the refresh loop until shutdown.
    ///
    /// Every 30 seconds the scheduler reads the enabled podcasts from the
    /// database (so subscriptions added at runtime are included) and
    /// refreshes those whose `check_interval` has elapsed since their
    /// last check. Failures are recorded per podcast and do not stop the
    /// loop.
    pub async fn run(self) {
        info!("Feed scheduler started");

        let interval = self.downloader.config.feeds.check_interval;

        loop {
            tokio::select! {
                _ = self.downloader.shutdown_token.cancelled() => {
                    info!("Feed scheduler shutting down");
                    return;
                }
                _ = sleep(POLL_INTERVAL) => {}
            }

            let podcasts = match self.downloader.db.list_enabled_podcasts().await {
                Ok(podcasts) => podcasts,
                Err(e) => {
                    warn!(error = %e, "Failed to load podcasts, retrying next cycle");
                    continue;
                }
            };

            if podcasts.is_empty() {
                debug!("No podcasts subscribed, scheduler idle");
                continue;
            }

            let now = chrono::Utc::now().timestamp();
            for podcast in podcasts {
                let due = podcast
                    .last_check
                    .is_none_or(|last| now - last >= interval.as_secs() as i64);
                if !due {
                    continue;
                }

                debug!(podcast_id = podcast.id, url = %podcast.url, "Refreshing feed");
                if let Err(e) = self
                    .downloader
                    .update_podcast(PodcastId(podcast.id))
                    .await
                {
                    // update_podcast already recorded the error on the row
                    warn!(podcast_id = podcast.id, error = %e, "Feed refresh failed");
                }

                if self.downloader.shutdown_token.is_cancelled() {
                    info!("Feed scheduler shutting down");
                    return;
                }
            }
        }
    }
}
