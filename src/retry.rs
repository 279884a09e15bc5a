//! Retry logic for transient download failures
//!
//! This module provides configurable retry logic for transient failures.
//! Episode downloads retry a fixed set of HTTP statuses, connection
//! problems, and truncated transfers; everything else fails the operation
//! immediately.
//!
//! # Example
//!
//! ```no_run
//! use podcast_dl::retry::{IsRetryable, with_retry};
//! use podcast_dl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let result = with_retry(&config, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{DownloadError, Error, SyncError};
use std::future::Future;
use std::time::Duration;

/// HTTP statuses that indicate a transient server-side problem worth
/// retrying: request timeout, teapot-as-ratelimit, gateway timeout, and
/// the 598/599 proxy timeout conventions.
pub const RETRYABLE_HTTP_STATUSES: [u16; 5] = [408, 418, 504, 598, 599];

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, truncated transfers, specific
/// HTTP statuses) should return `true`. Permanent failures (missing
/// episodes, invalid state, disk full) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

/// Implementation of IsRetryable for our Error type
impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Network errors: retry timeouts and connection problems
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            // I/O errors can be retryable in some cases
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Download(e) => e.is_retryable(),
            Error::Sync(e) => e.is_retryable(),
            // Feed errors surface once per update cycle; the scheduler
            // tries again on its own interval instead
            Error::Feed(_) => false,
            // Database errors should not be retried (likely permanent)
            Error::Database(_) | Error::Sqlx(_) => false,
            // Config errors are permanent
            Error::Config { .. } => false,
            // Not found is permanent
            Error::NotFound(_) => false,
            // Shutdown in progress - not retryable
            Error::ShuttingDown => false,
            // Serialization errors are permanent
            Error::Serialization(_) => false,
            // Disk space errors are permanent (need user action to free space)
            Error::InsufficientSpace { .. } => false,
            Error::DiskSpaceCheckFailed(_) => false,
            // Unknown errors - be conservative and don't retry
            Error::Other(_) => false,
        }
    }
}

impl IsRetryable for DownloadError {
    fn is_retryable(&self) -> bool {
        match self {
            DownloadError::HttpStatus { status, .. } => RETRYABLE_HTTP_STATUSES.contains(status),
            // A truncated body usually means the connection dropped mid-
            // transfer; the partial file allows the retry to resume
            DownloadError::ContentTooShort { .. } => true,
            DownloadError::NotFound { .. }
            | DownloadError::AlreadyActive { .. }
            | DownloadError::InvalidState { .. }
            | DownloadError::WriteFailed { .. }
            | DownloadError::InsufficientSpace { .. } => false,
        }
    }
}

impl IsRetryable for SyncError {
    fn is_retryable(&self) -> bool {
        match self {
            // Auth failures disable sync entirely instead of retrying
            SyncError::Unauthorized { .. } => false,
            SyncError::HttpStatus { status, .. } => {
                *status >= 500 || RETRYABLE_HTTP_STATUSES.contains(status)
            }
            SyncError::RequestFailed(_) => true,
            SyncError::UnexpectedResponse(_) => false,
            SyncError::Disabled => false,
        }
    }
}

/// Execute an async operation with retry logic
///
/// # Arguments
///
/// * `config` - Retry configuration (max attempts, delays, backoff multiplier)
/// * `operation` - Async closure that returns Result<T, E> where E implements IsRetryable
///
/// # Returns
///
/// Returns the successful result or the last error after all retry attempts
/// are exhausted.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                // Wait before retrying
                tokio::time::sleep(delay).await;

                // Apply the backoff multiplier (1.0 keeps the delay constant)
                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(
                        error = %e,
                        "Operation failed with non-retryable error"
                    );
                }
                return Err(e);
            }
        }
    }
}
