//! # podcast-dl
//!
//! Highly configurable backend library for podcast aggregator applications.
//!
//! ## Design Philosophy
//!
//! podcast-dl is designed to be:
//! - **Highly configurable** - Almost every behavior can be customized
//! - **Sensible defaults** - Works out of the box with zero configuration
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! The crate covers the three pillars of a podcast client backend:
//! feed fetching with episode reconciliation, a download queue with
//! pause/resume/cancel and HTTP range resume, and a gpodder.net-compatible
//! sync client with a durable offline action queue.
//!
//! ## Quick Start
//!
//! ```no_run
//! use podcast_dl::{Config, PodcastDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let downloader = PodcastDownloader::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Subscribe to a feed and download its newest episode
//!     let podcast_id = downloader.subscribe("https://example.com/feed.xml").await?;
//!     if let Some(episode) = downloader.db.list_episodes(podcast_id).await?.first() {
//!         downloader.add_task(podcast_dl::EpisodeId(episode.id), false).await?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Feed fetching, parsing, and reconciliation
pub mod feed;
/// Background feed refresh scheduling
pub mod feed_scheduler;
/// Pluggable media URL resolution
pub mod resolver;
/// Retry logic for transient failures
pub mod retry;
/// Bandwidth limiting with token bucket
pub mod speed_limiter;
/// gpodder.net web service synchronization
pub mod sync;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use downloader::{DownloadTask, PodcastDownloader};
pub use error::{DatabaseError, DownloadError, Error, FeedError, Result, SyncError};
pub use resolver::{PassthroughResolver, UrlResolver};
pub use sync::SyncManager;
pub use types::{
    DownloadInfo, DownloadStrategy, EpisodeActionKind, EpisodeId, EpisodeState, Event, PodcastId,
    QueueStats, Status, SubscribeKind,
};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's
/// `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use podcast_dl::{Config, PodcastDownloader, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let downloader = PodcastDownloader::new(config).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: PodcastDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
