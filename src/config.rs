//! Configuration types for podcast-dl

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Download behavior configuration (directories, concurrency, bandwidth)
///
/// Groups settings related to how episode downloads are fetched and stored.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Download directory (default: "./downloads"); each podcast gets a
    /// subdirectory below it
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Maximum concurrent downloads (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Whether the concurrent download limit is enforced at all
    /// (default: true). When false, a worker is spawned for every
    /// queued task.
    #[serde(default = "default_true")]
    pub limit_downloads_enabled: bool,

    /// Speed limit in bytes per second (None = unlimited). Takes effect
    /// immediately, including for downloads already in flight.
    #[serde(default)]
    pub speed_limit_bps: Option<u64>,

    /// Minimum free disk space required to start a download, in bytes
    /// (default: 100 MiB)
    #[serde(default = "default_min_free_space")]
    pub min_free_space_bytes: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_concurrent_downloads: default_max_concurrent(),
            limit_downloads_enabled: true,
            speed_limit_bps: None,
            min_free_space_bytes: default_min_free_space(),
        }
    }
}

/// Retry configuration for transient download failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the initial try (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each attempt (default: 1.0,
    /// i.e. a constant pause between attempts)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 1.0,
        }
    }
}

/// Feed update configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Maximum episodes kept per podcast (None = unlimited). Enforced both
    /// when truncating incoming entries and as a retention limit in the
    /// database.
    #[serde(default)]
    pub max_episodes: Option<usize>,

    /// Entries published more than this many days before the newest known
    /// episode are inserted without the new flag (default: 7)
    #[serde(default = "default_backdate_grace_days")]
    pub backdate_grace_days: i64,

    /// How often the scheduler refreshes each podcast (default: 30 minutes)
    #[serde(default = "default_check_interval", with = "duration_serde")]
    pub check_interval: Duration,

    /// HTTP timeout for feed fetches (default: 30 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub fetch_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            max_episodes: None,
            backdate_grace_days: default_backdate_grace_days(),
            check_interval: default_check_interval(),
            fetch_timeout: default_fetch_timeout(),
        }
    }
}

/// gpodder.net web service synchronization configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Whether sync is enabled (default: false). An authentication failure
    /// flips the persistent disable flag in the database, which overrides
    /// this setting until cleared.
    #[serde(default)]
    pub enabled: bool,

    /// Sync server hostname (default: "gpodder.net")
    #[serde(default = "default_sync_server")]
    pub server: String,

    /// Account username
    #[serde(default)]
    pub username: String,

    /// Account password
    #[serde(default)]
    pub password: String,

    /// Device identifier registered with the server
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// Human-readable device caption
    #[serde(default = "default_device_caption")]
    pub device_caption: String,

    /// Device type reported to the server ("desktop", "laptop", "mobile",
    /// "server", "other")
    #[serde(default = "default_device_type")]
    pub device_type: String,

    /// Debounce before a scheduled flush uploads queued actions
    /// (default: 60 seconds). Forced flushes skip the debounce.
    #[serde(default = "default_flush_timeout", with = "duration_serde")]
    pub flush_timeout: Duration,

    /// How many times a failed flush cycle is retried before giving up
    /// until the next scheduled flush (default: 3)
    #[serde(default = "default_sync_retries")]
    pub max_sync_retries: u32,

    /// Episode actions uploaded per request (default: 100)
    #[serde(default = "default_action_batch_size")]
    pub action_batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server: default_sync_server(),
            username: String::new(),
            password: String::new(),
            device_id: default_device_id(),
            device_caption: default_device_caption(),
            device_type: default_device_type(),
            flush_timeout: default_flush_timeout(),
            max_sync_retries: default_sync_retries(),
            action_batch_size: default_action_batch_size(),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./podcast-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Main configuration for PodcastDownloader
///
/// Fields are organized into logical sub-configs for maintainability:
/// - [`download`](DownloadConfig) — directories, concurrency, bandwidth
/// - [`retry`](RetryConfig) — transient failure handling
/// - [`feeds`](FeedConfig) — feed refresh and retention
/// - [`sync`](SyncConfig) — gpodder.net synchronization
/// - [`persistence`](PersistenceConfig) — database location
///
/// All sub-config fields are flattened for serialization, meaning the
/// JSON/TOML format has no nesting except for `persistence` and `sync`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Retry behavior for transient download failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Feed update behavior
    #[serde(flatten)]
    pub feeds: FeedConfig,

    /// gpodder.net synchronization settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Data storage and state management
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

// Convenience accessors — allow call sites to use `config.download_dir()`
// without reaching into the sub-config structs.
impl Config {
    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Database path
    pub fn database_path(&self) -> &PathBuf {
        &self.persistence.database_path
    }
}

// Default value functions
fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("podcast-dl.db")
}

fn default_max_concurrent() -> usize {
    3
}

fn default_min_free_space() -> u64 {
    100 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_backdate_grace_days() -> i64 {
    7
}

fn default_check_interval() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_sync_server() -> String {
    "gpodder.net".to_string()
}

fn default_device_id() -> String {
    "podcast-dl".to_string()
}

fn default_device_caption() -> String {
    "podcast-dl".to_string()
}

fn default_device_type() -> String {
    "server".to_string()
}

fn default_flush_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_sync_retries() -> u32 {
    3
}

fn default_action_batch_size() -> usize {
    100
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
