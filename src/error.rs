//! Error types for podcast-dl
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Download, Feed, Sync, Database)
//! - Context information (episode ID, URL, HTTP status, file path)
//! - Classification hooks used by the retry layer (see [`crate::retry`])

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for podcast-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for podcast-dl
///
/// This is the primary error type used throughout the library. Each variant
/// includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download_dir")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Download-related error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Feed fetching or parsing error
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    /// Web service synchronization error
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new downloads
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Insufficient disk space
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required for the operation
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },

    /// Failed to check disk space
    #[error("failed to check disk space: {0}")]
    DiskSpaceCheckFailed(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Constraint violation (e.g., duplicate feed URL)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Download-related errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Episode not found in the database
    #[error("episode {id} not found")]
    NotFound {
        /// The episode ID that was not found
        id: i64,
    },

    /// A live download task already exists for this episode
    #[error("episode {id} already has an active download task")]
    AlreadyActive {
        /// The episode ID with the existing task
        id: i64,
    },

    /// Cannot perform operation in current state
    #[error("cannot {operation} download {id} in state {current_state}")]
    InvalidState {
        /// The episode ID in an invalid state for the operation
        id: i64,
        /// The operation that was attempted (e.g., "pause", "resume")
        operation: String,
        /// The current state that prevents the operation
        current_state: String,
    },

    /// Server answered with an error status
    #[error("HTTP error {status} for {url}")]
    HttpStatus {
        /// The URL that was requested
        url: String,
        /// The HTTP status code returned
        status: u16,
    },

    /// The response body ended before the advertised content length
    #[error("content too short: received {received} of {expected} bytes")]
    ContentTooShort {
        /// Bytes actually received
        received: u64,
        /// Bytes the server advertised
        expected: u64,
    },

    /// Failed to write the downloaded data to disk
    #[error("failed to write {path}: {reason}")]
    WriteFailed {
        /// The partial file path being written
        path: PathBuf,
        /// The underlying I/O failure
        reason: String,
    },

    /// Insufficient disk space to start the download
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required for the download
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },
}

/// Feed fetching and parsing errors
#[derive(Debug, Error)]
pub enum FeedError {
    /// Fetching the feed over HTTP failed
    #[error("failed to fetch feed from {url}: {reason}")]
    FetchFailed {
        /// The feed URL
        url: String,
        /// The underlying failure
        reason: String,
    },

    /// Server answered the feed request with an error status
    #[error("HTTP error {status} fetching feed {url}")]
    HttpStatus {
        /// The feed URL
        url: String,
        /// The HTTP status code returned
        status: u16,
    },

    /// The document parsed as neither RSS nor Atom
    #[error("failed to parse feed: {0}")]
    ParseFailed(String),

    /// Feed URL is not a valid URL
    #[error("invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Web service synchronization errors
#[derive(Debug, Error)]
pub enum SyncError {
    /// Credentials rejected by the server. This disables sync entirely
    /// rather than retrying forever against invalid credentials.
    #[error("authentication rejected by {server}")]
    Unauthorized {
        /// The sync server hostname
        server: String,
    },

    /// Server answered with an error status
    #[error("HTTP error {status} from sync server for {endpoint}")]
    HttpStatus {
        /// The API endpoint path
        endpoint: String,
        /// The HTTP status code returned
        status: u16,
    },

    /// Request failed before a response arrived
    #[error("sync request failed: {0}")]
    RequestFailed(String),

    /// Response body did not match the expected schema
    #[error("unexpected sync response: {0}")]
    UnexpectedResponse(String),

    /// Sync is disabled (by configuration or after an auth failure)
    #[error("sync is disabled")]
    Disabled,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_error_display_includes_episode_id() {
        let err = Error::Download(DownloadError::NotFound { id: 42 });
        assert!(
            err.to_string().contains("42"),
            "message should mention the episode ID, got: {err}"
        );
    }

    #[test]
    fn invalid_state_display_names_operation_and_state() {
        let err = DownloadError::InvalidState {
            id: 7,
            operation: "pause".into(),
            current_state: "Done".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("pause"), "got: {msg}");
        assert!(msg.contains("Done"), "got: {msg}");
    }

    #[test]
    fn content_too_short_display_includes_byte_counts() {
        let err = DownloadError::ContentTooShort {
            received: 400,
            expected: 1000,
        };
        let msg = err.to_string();
        assert!(msg.contains("400"), "got: {msg}");
        assert!(msg.contains("1000"), "got: {msg}");
    }

    #[test]
    fn sync_unauthorized_display_names_the_server() {
        let err = SyncError::Unauthorized {
            server: "gpodder.net".into(),
        };
        assert!(err.to_string().contains("gpodder.net"));
    }

    #[test]
    fn domain_errors_convert_into_top_level_error() {
        let db: Error = DatabaseError::QueryFailed("boom".into()).into();
        assert!(matches!(db, Error::Database(_)));

        let feed: Error = FeedError::ParseFailed("not xml".into()).into();
        assert!(matches!(feed, Error::Feed(_)));

        let sync: Error = SyncError::Disabled.into();
        assert!(matches!(sync, Error::Sync(_)));
    }

    #[test]
    fn io_error_converts_and_preserves_message() {
        let err: Error = std::io::Error::other("disk fail").into();
        assert!(err.to_string().contains("disk fail"));
    }

    #[test]
    fn insufficient_space_display_includes_byte_counts() {
        let err = Error::InsufficientSpace {
            required: 1_048_576,
            available: 512,
        };
        let msg = err.to_string();
        assert!(msg.contains("1048576"));
        assert!(msg.contains("512"));
    }
}
