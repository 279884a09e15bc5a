//! Database layer for podcast-dl
//!
//! Handles SQLite persistence for podcasts, episodes, and the web-sync
//! action queues.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`podcasts`] — Podcast subscription CRUD
//! - [`episodes`] — Episode CRUD, download state, retention
//! - [`sync`] — Offline action queues, received actions, watermarks
//! - [`state`] — Runtime state (shutdown tracking, sync disable flag)

use sqlx::{FromRow, sqlite::SqlitePool};

mod episodes;
mod migrations;
mod podcasts;
mod state;
mod sync;

/// New podcast subscription to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewPodcast {
    /// Podcast title (from the feed channel)
    pub title: String,
    /// Feed URL (unique per subscription)
    pub url: String,
    /// Website link from the feed
    pub link: Option<String>,
    /// Channel description
    pub description: Option<String>,
    /// Cover art URL
    pub cover_url: Option<String>,
}

/// Podcast subscription record from database
#[derive(Debug, Clone, FromRow)]
pub struct Podcast {
    /// Unique database ID
    pub id: i64,
    /// Podcast title
    pub title: String,
    /// Feed URL
    pub url: String,
    /// Website link from the feed
    pub link: Option<String>,
    /// Channel description
    pub description: Option<String>,
    /// Cover art URL
    pub cover_url: Option<String>,
    /// New-episode flagging strategy (see [`crate::types::DownloadStrategy`])
    pub download_strategy: i32,
    /// Whether the feed scheduler refreshes this podcast (0 = no, 1 = yes)
    pub enabled: i32,
    /// Unix timestamp of the last feed check
    pub last_check: Option<i64>,
    /// Last error message from checking the feed
    pub last_error: Option<String>,
    /// Unix timestamp when the subscription was created
    pub created_at: i64,
}

/// New episode to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewEpisode {
    /// Podcast this episode belongs to
    pub podcast_id: crate::types::PodcastId,
    /// Episode title
    pub title: String,
    /// Episode description / show notes
    pub description: Option<String>,
    /// Enclosure (media) URL
    pub url: String,
    /// Feed GUID; falls back to the enclosure URL when the feed has none
    pub guid: String,
    /// Episode web page link
    pub link: Option<String>,
    /// Publish timestamp (Unix seconds)
    pub published: i64,
    /// Playback duration in seconds, if the feed declared one
    pub duration_secs: Option<i64>,
    /// Enclosure size in bytes as last known (corrected mid-download when
    /// the server reports a different total)
    pub file_size: i64,
    /// Enclosure mimetype
    pub mime_type: Option<String>,
    /// Whether this episode should appear in the new-episodes list
    pub is_new: bool,
    /// Filename the download will be stored under
    pub download_filename: String,
}

/// Episode record from database
#[derive(Debug, Clone, FromRow)]
pub struct Episode {
    /// Unique database ID
    pub id: i64,
    /// Podcast this episode belongs to
    pub podcast_id: i64,
    /// Episode title
    pub title: String,
    /// Episode description / show notes
    pub description: Option<String>,
    /// Enclosure (media) URL
    pub url: String,
    /// Feed GUID (unique within the podcast)
    pub guid: String,
    /// Episode web page link
    pub link: Option<String>,
    /// Publish timestamp (Unix seconds)
    pub published: i64,
    /// Playback duration in seconds
    pub duration_secs: Option<i64>,
    /// Enclosure size in bytes as last known
    pub file_size: i64,
    /// Enclosure mimetype
    pub mime_type: Option<String>,
    /// Episode lifecycle state (see [`crate::types::EpisodeState`])
    pub state: i32,
    /// Whether this episode is flagged new (0 = no, 1 = yes)
    pub is_new: i32,
    /// Filename the download is (or will be) stored under
    pub download_filename: String,
    /// Download task status (see [`crate::types::Status`]); NULL when no
    /// download was ever requested
    pub download_status: Option<i32>,
    /// Error message from the last failed download
    pub error_message: Option<String>,
    /// Playback position in seconds
    pub current_position: i64,
    /// Unix timestamp when the playback position last changed; the episode
    /// action merge only applies remote positions newer than this
    pub current_position_updated: i64,
    /// Unix timestamp when the episode row was created
    pub created_at: i64,
}

/// Queued local subscription mutation awaiting upload
#[derive(Debug, Clone, FromRow)]
pub struct SubscribeActionRow {
    /// Unique database ID
    pub id: i64,
    /// Feed URL the action applies to
    pub url: String,
    /// Action kind (see [`crate::types::SubscribeKind`])
    pub kind: i32,
    /// Unix timestamp when the action was queued
    pub created_at: i64,
}

/// Parameters for queueing a local episode action
#[derive(Debug, Clone)]
pub struct NewEpisodeAction<'a> {
    /// Feed URL of the episode's podcast
    pub podcast_url: &'a str,
    /// Enclosure URL identifying the episode
    pub episode_url: &'a str,
    /// Action kind code (see [`crate::types::EpisodeActionKind`])
    pub kind: i32,
    /// Playback start position in seconds (play actions)
    pub started: Option<i64>,
    /// Playback position in seconds (play actions)
    pub position: Option<i64>,
    /// Total episode duration in seconds (play actions)
    pub total: Option<i64>,
    /// Unix timestamp when the action happened
    pub timestamp: i64,
}

/// Queued local episode action awaiting upload
#[derive(Debug, Clone, FromRow)]
pub struct EpisodeActionRow {
    /// Unique database ID
    pub id: i64,
    /// Feed URL of the episode's podcast
    pub podcast_url: String,
    /// Enclosure URL identifying the episode
    pub episode_url: String,
    /// Action kind (see [`crate::types::EpisodeActionKind`])
    pub kind: i32,
    /// Playback start position in seconds (play actions)
    pub started: Option<i64>,
    /// Playback position in seconds (play actions)
    pub position: Option<i64>,
    /// Total episode duration in seconds (play actions)
    pub total: Option<i64>,
    /// Unix timestamp when the action happened
    pub timestamp: i64,
}

/// Server-side subscription change pulled during sync, awaiting the
/// consumer's confirmation
#[derive(Debug, Clone, FromRow)]
pub struct ReceivedSubscribeRow {
    /// Unique database ID
    pub id: i64,
    /// Feed URL the change applies to
    pub url: String,
    /// Action kind (see [`crate::types::SubscribeKind`])
    pub kind: i32,
    /// Server timestamp of the change
    pub timestamp: i64,
}

/// Episode action downloaded from the server, awaiting merge
#[derive(Debug, Clone, FromRow)]
pub struct ReceivedEpisodeActionRow {
    /// Unique database ID
    pub id: i64,
    /// Feed URL of the episode's podcast
    pub podcast_url: String,
    /// Enclosure URL identifying the episode
    pub episode_url: String,
    /// Action kind (see [`crate::types::EpisodeActionKind`])
    pub kind: i32,
    /// Playback start position in seconds (play actions)
    pub started: Option<i64>,
    /// Playback position in seconds (play actions)
    pub position: Option<i64>,
    /// Total episode duration in seconds (play actions)
    pub total: Option<i64>,
    /// Remote timestamp of the action (drives last-writer-wins merging)
    pub timestamp: i64,
}

/// URL-rewrite hint returned by the sync server when it canonicalizes a
/// subscribed feed URL
#[derive(Debug, Clone, FromRow)]
pub struct RewrittenUrlRow {
    /// Unique database ID
    pub id: i64,
    /// URL as subscribed locally
    pub old_url: String,
    /// Canonical URL reported by the server
    pub new_url: String,
    /// Unix timestamp when the hint was recorded
    pub created_at: i64,
}

/// Database handle for podcast-dl
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
