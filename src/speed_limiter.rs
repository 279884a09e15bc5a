//! Bandwidth limiting using a token bucket
//!
//! The SpeedLimiter provides global bandwidth limiting across all concurrent
//! episode downloads using an efficient lock-free token bucket.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Global speed limiter shared across all downloads
///
/// All concurrent downloads share the same bucket, naturally distributing
/// bandwidth based on demand. Download tasks call [`acquire`](Self::acquire)
/// before writing each chunk; limit changes made through
/// [`set_limit`](Self::set_limit) take effect immediately, including for
/// transfers already in flight — the acquire loop re-reads the limit on
/// every iteration.
///
/// # Algorithm
///
/// - Tokens represent bytes that can be transferred
/// - Tokens refill at a constant rate (limit_bps)
/// - Downloads acquire tokens before transferring data
/// - If insufficient tokens, the download waits until refill
#[derive(Clone)]
pub struct SpeedLimiter {
    /// Speed limit in bytes per second (0 = unlimited)
    limit_bps: Arc<AtomicU64>,
    /// Available tokens (current bucket capacity in bytes)
    tokens: Arc<AtomicU64>,
    /// Last refill timestamp (nanoseconds since arbitrary epoch)
    last_refill: Arc<AtomicU64>,
}

impl SpeedLimiter {
    /// Create a new SpeedLimiter with the specified limit
    ///
    /// # Arguments
    ///
    /// * `limit_bps` - Speed limit in bytes per second (None = unlimited)
    ///
    /// # Examples
    ///
    /// ```
    /// use podcast_dl::speed_limiter::SpeedLimiter;
    ///
    /// // 1 MB/s limit
    /// let limiter = SpeedLimiter::new(Some(1024 * 1024));
    ///
    /// // Unlimited
    /// let unlimited = SpeedLimiter::new(None);
    /// ```
    #[must_use]
    pub fn new(limit_bps: Option<u64>) -> Self {
        let limit = limit_bps.unwrap_or(0);
        let now = Self::now_nanos();

        Self {
            limit_bps: Arc::new(AtomicU64::new(limit)),
            tokens: Arc::new(AtomicU64::new(limit)),
            last_refill: Arc::new(AtomicU64::new(now)),
        }
    }

    /// Set a new speed limit
    ///
    /// This takes effect immediately. If increasing the limit, tokens are
    /// refilled to the new capacity. If decreasing, excess tokens remain
    /// until consumed.
    pub fn set_limit(&self, limit_bps: Option<u64>) {
        let new_limit = limit_bps.unwrap_or(0);
        let old_limit = self.limit_bps.swap(new_limit, Ordering::SeqCst);

        // If increasing limit, add extra tokens to bucket
        if new_limit > old_limit {
            let extra_tokens = new_limit - old_limit;
            self.tokens.fetch_add(extra_tokens, Ordering::SeqCst);
        }
    }

    /// Get the current speed limit
    ///
    /// Returns None if unlimited, otherwise the limit in bytes per second.
    pub fn get_limit(&self) -> Option<u64> {
        let limit = self.limit_bps.load(Ordering::Relaxed);
        if limit == 0 { None } else { Some(limit) }
    }

    /// Acquire permission to transfer the specified number of bytes
    ///
    /// This method waits until sufficient tokens are available. For
    /// unlimited speed (limit = 0), this returns immediately.
    pub async fn acquire(&self, bytes: u64) {
        // Fast path: nothing to acquire
        if bytes == 0 {
            return;
        }

        // Fast path: unlimited speed
        if self.limit_bps.load(Ordering::Relaxed) == 0 {
            return;
        }

        let mut remaining = bytes;

        loop {
            // Re-read the limit each iteration so dynamic changes take effect
            let limit = self.limit_bps.load(Ordering::Relaxed);
            if limit == 0 {
                // Limit was removed while we were waiting — no throttle needed
                return;
            }

            // Refill tokens based on elapsed time
            self.refill_tokens();

            // Try to consume available tokens (partial consumption allowed)
            let current_tokens = self.tokens.load(Ordering::SeqCst);
            let to_consume = remaining.min(current_tokens);

            if to_consume > 0 {
                if self
                    .tokens
                    .compare_exchange(
                        current_tokens,
                        current_tokens - to_consume,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_ok()
                {
                    remaining -= to_consume;
                    if remaining == 0 {
                        return;
                    }
                }
                // CAS failed or still have remaining — retry immediately
                continue;
            }

            // No tokens available — wait for refill.
            // Cap sleep at 100ms so we re-check the limit frequently,
            // allowing dynamic limit changes to take effect promptly.
            let wait_ms = (remaining as f64 / limit as f64 * 1000.0) as u64;
            tokio::time::sleep(Duration::from_millis(wait_ms.clamp(10, 100))).await;
        }
    }

    /// Refill tokens based on elapsed time since last refill
    fn refill_tokens(&self) {
        let limit = self.limit_bps.load(Ordering::Relaxed);
        if limit == 0 {
            return; // Unlimited
        }

        let now = Self::now_nanos();
        let last = self.last_refill.load(Ordering::SeqCst);

        let elapsed_nanos = now.saturating_sub(last);
        let elapsed_secs = elapsed_nanos as f64 / 1_000_000_000.0;

        // Tokens to add: bytes per second * seconds elapsed
        let tokens_to_add = (limit as f64 * elapsed_secs) as u64;

        if tokens_to_add > 0 {
            // Only the task that wins the timestamp CAS adds tokens
            if self
                .last_refill
                .compare_exchange(last, now, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                // Add tokens, but cap at limit (bucket capacity)
                let current_tokens = self.tokens.load(Ordering::SeqCst);
                let new_tokens = (current_tokens + tokens_to_add).min(limit);
                self.tokens.store(new_tokens, Ordering::SeqCst);
            }
        }
    }

    /// Get current monotonic time in nanoseconds
    ///
    /// Uses a monotonic clock that is not affected by system time changes.
    /// The epoch is arbitrary but consistent within a process lifetime.
    fn now_nanos() -> u64 {
        static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        let start = START.get_or_init(Instant::now);
        start.elapsed().as_nanos() as u64
    }
}
