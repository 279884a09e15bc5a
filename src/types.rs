//! Core types for podcast-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique identifier for an episode
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpisodeId(pub i64);

impl EpisodeId {
    /// Create a new EpisodeId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for EpisodeId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<EpisodeId> for i64 {
    fn from(id: EpisodeId) -> Self {
        id.0
    }
}

impl PartialEq<i64> for EpisodeId {
    fn eq(&self, other: &i64) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EpisodeId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for EpisodeId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for EpisodeId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for EpisodeId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Unique identifier for a subscribed podcast
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PodcastId(pub i64);

impl PodcastId {
    /// Create a new PodcastId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for PodcastId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<PodcastId> for i64 {
    fn from(id: PodcastId) -> Self {
        id.0
    }
}

impl std::fmt::Display for PodcastId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PodcastId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl sqlx::Type<sqlx::Sqlite> for PodcastId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for PodcastId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for PodcastId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Download task status
///
/// A freshly requested download enters the queue as `Queued`; there is no
/// separate "created but not enqueued" state because task creation and
/// enqueueing happen atomically in `add_task`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Queued and waiting for a worker
    Queued,
    /// Currently downloading
    Downloading,
    /// Paused by user (partial file kept for resume)
    Paused,
    /// Successfully completed
    Done,
    /// Failed with error
    Failed,
    /// Cancelled by user (partial file deleted)
    Cancelled,
}

impl Status {
    /// Convert integer status code to Status enum
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => Status::Queued,
            1 => Status::Downloading,
            2 => Status::Paused,
            3 => Status::Done,
            4 => Status::Failed,
            5 => Status::Cancelled,
            _ => Status::Failed, // Default to Failed for unknown status
        }
    }

    /// Convert Status enum to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            Status::Queued => 0,
            Status::Downloading => 1,
            Status::Paused => 2,
            Status::Done => 3,
            Status::Failed => 4,
            Status::Cancelled => 5,
        }
    }

    /// Whether this status is terminal (the task will not run again
    /// without being re-queued explicitly)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Done | Status::Failed | Status::Cancelled)
    }
}

/// Lifecycle state of an episode independent of any in-flight download
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeState {
    /// Known from the feed, not downloaded
    Normal,
    /// Downloaded and available on disk
    Downloaded,
    /// Deleted locally (file removed, episode record kept)
    Deleted,
}

impl EpisodeState {
    /// Convert integer state code to EpisodeState enum
    pub fn from_i32(state: i32) -> Self {
        match state {
            0 => EpisodeState::Normal,
            1 => EpisodeState::Downloaded,
            2 => EpisodeState::Deleted,
            _ => EpisodeState::Normal, // Default to Normal for unknown state
        }
    }

    /// Convert EpisodeState enum to integer state code
    pub fn to_i32(&self) -> i32 {
        match self {
            EpisodeState::Normal => 0,
            EpisodeState::Downloaded => 1,
            EpisodeState::Deleted => 2,
        }
    }
}

/// Event emitted during download, feed, and sync lifecycles
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Download task added to queue
    TaskQueued {
        /// Episode ID
        id: EpisodeId,
        /// Episode title
        title: String,
    },

    /// Download task removed from queue
    TaskRemoved {
        /// Episode ID
        id: EpisodeId,
    },

    /// Download progress update
    Downloading {
        /// Episode ID
        id: EpisodeId,
        /// Progress fraction (0.0 to 1.0)
        progress: f32,
        /// Current speed in bytes per second
        speed_bps: u64,
    },

    /// Download completed successfully
    DownloadComplete {
        /// Episode ID
        id: EpisodeId,
    },

    /// Download failed
    DownloadFailed {
        /// Episode ID
        id: EpisodeId,
        /// Error message
        error: String,
    },

    /// Download paused (partial file kept)
    DownloadPaused {
        /// Episode ID
        id: EpisodeId,
    },

    /// Download cancelled (partial file deleted)
    DownloadCancelled {
        /// Episode ID
        id: EpisodeId,
    },

    /// Episode file landed on disk and the episode was marked downloaded.
    /// Fired after the database update, mirroring the aggregator's
    /// post-download hook.
    EpisodeDownloaded {
        /// Episode ID
        id: EpisodeId,
        /// Final path of the media file
        path: PathBuf,
    },

    /// Episode vanished from its feed and was removed from the podcast.
    /// Fired before the database row is deleted.
    EpisodeRemoved {
        /// Episode ID
        id: EpisodeId,
        /// Episode GUID
        guid: String,
    },

    /// Feed update finished for a podcast
    FeedUpdated {
        /// Podcast ID
        id: PodcastId,
        /// Number of genuinely new episodes found
        new_episodes: usize,
        /// Number of unreachable episodes purged
        removed_episodes: usize,
    },

    /// Feed update failed for a podcast
    FeedUpdateFailed {
        /// Podcast ID
        id: PodcastId,
        /// Error message
        error: String,
    },

    /// A sync flush cycle completed successfully
    SyncCompleted {
        /// Number of episode actions uploaded
        uploaded_actions: usize,
        /// Number of episode actions received from the server
        received_actions: usize,
    },

    /// Sync was disabled (authentication rejected by the server)
    SyncDisabled {
        /// Reason for disabling
        reason: String,
    },

    /// The server rewrote a subscription URL to its canonical form
    SubscriptionRewritten {
        /// URL as subscribed locally
        old_url: String,
        /// Canonical URL reported by the server
        new_url: String,
    },

    /// Speed limit changed
    SpeedLimitChanged {
        /// New limit in bytes per second (None = unlimited)
        limit_bps: Option<u64>,
    },

    /// All downloads paused
    QueuePaused,

    /// All paused downloads resumed
    QueueResumed,

    /// Graceful shutdown initiated
    Shutdown,
}

/// Information about a download task in the queue
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadInfo {
    /// Episode this task downloads
    pub id: EpisodeId,

    /// Episode title
    pub title: String,

    /// Current status
    pub status: Status,

    /// Progress fraction (0.0 to 1.0)
    pub progress: f32,

    /// Current download speed in bytes per second
    pub speed_bps: u64,

    /// Total size in bytes (0 if unknown)
    pub total_size: u64,

    /// Error message, set when status is Failed
    pub error_message: Option<String>,
}

/// Queue statistics
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueStats {
    /// Number of tasks waiting in the queue
    pub queued: usize,

    /// Number of actively downloading tasks
    pub downloading: usize,

    /// Number of paused tasks
    pub paused: usize,

    /// Number of active worker loops
    pub workers: usize,

    /// Total download speed across all active tasks (bytes per second)
    pub total_speed_bps: u64,

    /// Current speed limit (None = unlimited)
    pub speed_limit_bps: Option<u64>,

    /// Whether the queue is accepting new tasks
    pub accepting_new: bool,
}

/// A podcast's download strategy, controlling how many fresh episodes are
/// flagged as new during a feed update
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStrategy {
    /// Every genuinely new episode is marked new
    #[default]
    Default,
    /// Only the most recent new episode per update pass is marked new
    OnlyLatest,
}

impl DownloadStrategy {
    /// Convert integer strategy code to DownloadStrategy enum
    pub fn from_i32(strategy: i32) -> Self {
        match strategy {
            1 => DownloadStrategy::OnlyLatest,
            _ => DownloadStrategy::Default,
        }
    }

    /// Convert DownloadStrategy enum to integer strategy code
    pub fn to_i32(&self) -> i32 {
        match self {
            DownloadStrategy::Default => 0,
            DownloadStrategy::OnlyLatest => 1,
        }
    }
}

/// Kind of a queued subscription mutation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscribeKind {
    /// Podcast was subscribed locally
    Add,
    /// Podcast was unsubscribed locally
    Remove,
}

impl SubscribeKind {
    /// Convert integer code to SubscribeKind
    pub fn from_i32(kind: i32) -> Self {
        match kind {
            1 => SubscribeKind::Remove,
            _ => SubscribeKind::Add,
        }
    }

    /// Convert SubscribeKind to integer code
    pub fn to_i32(&self) -> i32 {
        match self {
            SubscribeKind::Add => 0,
            SubscribeKind::Remove => 1,
        }
    }
}

/// Kind of an episode action exchanged with the sync service
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeActionKind {
    /// Episode was played (carries position telemetry)
    Play,
    /// Episode was downloaded
    Download,
    /// Episode was deleted locally
    Delete,
    /// Episode was marked new/unplayed
    New,
}

impl EpisodeActionKind {
    /// Convert integer code to EpisodeActionKind
    pub fn from_i32(kind: i32) -> Self {
        match kind {
            0 => EpisodeActionKind::Play,
            1 => EpisodeActionKind::Download,
            2 => EpisodeActionKind::Delete,
            _ => EpisodeActionKind::New,
        }
    }

    /// Convert EpisodeActionKind to integer code
    pub fn to_i32(&self) -> i32 {
        match self {
            EpisodeActionKind::Play => 0,
            EpisodeActionKind::Download => 1,
            EpisodeActionKind::Delete => 2,
            EpisodeActionKind::New => 3,
        }
    }

    /// Wire name used by the gpodder.net API
    pub fn as_wire(&self) -> &'static str {
        match self {
            EpisodeActionKind::Play => "play",
            EpisodeActionKind::Download => "download",
            EpisodeActionKind::Delete => "delete",
            EpisodeActionKind::New => "new",
        }
    }

    /// Parse a gpodder.net wire name; unknown kinds map to `New`, which the
    /// merge logic ignores
    pub fn from_wire(s: &str) -> Self {
        match s {
            "play" => EpisodeActionKind::Play,
            "download" => EpisodeActionKind::Download,
            "delete" => EpisodeActionKind::Delete,
            _ => EpisodeActionKind::New,
        }
    }
}

/// Snapshot of a podcast's reconciliation result after a feed update
#[derive(Clone, Debug, Default)]
pub struct FeedUpdateResult {
    /// Episodes inserted during this pass
    pub new_episodes: usize,
    /// Episodes updated in place (matched by GUID)
    pub updated_episodes: usize,
    /// Unreachable episodes purged
    pub removed_episodes: usize,
    /// When the update finished
    pub checked_at: Option<DateTime<Utc>>,
}
