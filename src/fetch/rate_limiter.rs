//! Call spacing and backoff state for the marketplace.
//!
//! The [`RateLimiter`] owns the process-wide [`RateLimiterState`]: the most
//! recently reserved call slot, the current backoff delay, and the length of
//! the current failure streak. Every read-modify-write of that state happens
//! under one `tokio::sync::Mutex`, so concurrent requests cannot race on the
//! timestamp or the failure counter.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use dataset_search_core::fetch::{Backoff, RateLimiter};
//!
//! # async fn example() {
//! let limiter = RateLimiter::new(Duration::from_millis(500), Backoff::default());
//!
//! // First call proceeds immediately
//! limiter.acquire().await;
//!
//! // Second call waits until 500ms have passed since the first
//! limiter.acquire().await;
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::retry::Backoff;

/// Warning threshold for cumulative spacing delay (30 seconds).
const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Maximum Retry-After value (1 hour) to prevent excessive delays.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Snapshot of the limiter's mutable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterState {
    /// Slot reserved for the latest call. `None` before the first call.
    pub last_call: Option<Instant>,
    /// Delay applied after the most recent failure; `base` after a success.
    pub current_backoff: Duration,
    /// Failures since the last success.
    pub consecutive_failures: u32,
}

/// Enforces minimum call spacing and tracks the backoff streak.
///
/// Designed to be owned by one fetcher that is shared across request tasks
/// via `Arc`.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum time between two issued calls.
    min_delay: Duration,

    /// Backoff curve for failure streaks.
    backoff: Backoff,

    /// Guarded state. `last_call` holds the most recently reserved slot,
    /// which may lie in the future while its caller sleeps.
    state: Mutex<RateLimiterState>,

    /// Total spacing delay applied, in milliseconds. Used only for warnings.
    cumulative_delay_ms: AtomicU64,
}

impl RateLimiter {
    /// Creates a limiter with the given minimum spacing and backoff curve.
    #[must_use]
    #[instrument(skip_all, fields(min_delay_ms = min_delay.as_millis()))]
    pub fn new(min_delay: Duration, backoff: Backoff) -> Self {
        debug!("creating marketplace rate limiter");
        Self {
            min_delay,
            backoff,
            state: Mutex::new(RateLimiterState {
                last_call: None,
                current_backoff: backoff.base(),
                consecutive_failures: 0,
            }),
            cumulative_delay_ms: AtomicU64::new(0),
        }
    }

    /// Returns a copy of the current state.
    pub async fn state(&self) -> RateLimiterState {
        *self.state.lock().await
    }

    /// Reserves the next call slot and waits until it arrives.
    ///
    /// The first call proceeds immediately. Each later caller takes the slot
    /// `min_delay` after the previously reserved one, so concurrent callers
    /// are spaced without holding the lock while they sleep. Returns how long
    /// this caller waited.
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Duration {
        let (now, slot) = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let slot = match state.last_call {
                Some(last_call) => (last_call + self.min_delay).max(now),
                None => {
                    debug!("first marketplace call - no delay");
                    now
                }
            };
            state.last_call = Some(slot);
            (now, slot)
        };

        let waited = slot.saturating_duration_since(now);
        if !waited.is_zero() {
            let cumulative = self.add_cumulative_delay(waited);

            debug!(
                delay_ms = waited.as_millis(),
                cumulative_ms = cumulative.as_millis(),
                "applying marketplace spacing delay"
            );

            if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD {
                warn!(
                    cumulative_delay_secs = cumulative.as_secs(),
                    "excessive rate limiting - consider fewer search terms or pages"
                );
            }

            tokio::time::sleep_until(slot).await;
        }

        waited
    }

    /// Records a retryable failure and returns the backoff delay to apply.
    ///
    /// The delay is `min(base × 2^consecutive_failures, max)` where the
    /// counter already includes this failure.
    #[instrument(skip(self))]
    pub async fn record_failure(&self) -> Duration {
        let mut state = self.state.lock().await;
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.current_backoff = self.backoff.delay_for(state.consecutive_failures);
        debug!(
            consecutive_failures = state.consecutive_failures,
            backoff_ms = state.current_backoff.as_millis(),
            "recorded marketplace failure"
        );
        state.current_backoff
    }

    /// Records a successful call, ending any failure streak.
    #[instrument(skip(self))]
    pub async fn record_success(&self) {
        let mut state = self.state.lock().await;
        if state.consecutive_failures > 0 {
            debug!(
                previous_failures = state.consecutive_failures,
                "marketplace recovered - resetting backoff"
            );
        }
        state.consecutive_failures = 0;
        state.current_backoff = self.backoff.base();
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let new_total = self
            .cumulative_delay_ms
            .fetch_add(delay_ms, Ordering::SeqCst)
            + delay_ms;
        Duration::from_millis(new_total)
    }
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports two formats as per RFC 7231:
/// - Integer seconds: `Retry-After: 120`
/// - HTTP-date: `Retry-After: Wed, 21 Oct 2025 07:28:00 GMT`
///
/// Returns `None` if the value cannot be parsed. Caps excessive values at 1 hour.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use dataset_search_core::fetch::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);
        if duration > MAX_RETRY_AFTER {
            warn!(
                seconds,
                max_seconds = MAX_RETRY_AFTER.as_secs(),
                "Retry-After exceeds maximum, capping at 1 hour"
            );
            return Some(MAX_RETRY_AFTER);
        }
        return Some(duration);
    }

    let Ok(datetime) = httpdate::parse_http_date(header_value) else {
        debug!(header_value, "unparseable Retry-After value");
        return None;
    };

    match datetime.duration_since(std::time::SystemTime::now()) {
        Ok(duration) if duration > MAX_RETRY_AFTER => {
            warn!(
                delay_secs = duration.as_secs(),
                max_secs = MAX_RETRY_AFTER.as_secs(),
                "Retry-After date exceeds maximum, capping at 1 hour"
            );
            Some(MAX_RETRY_AFTER)
        }
        Ok(duration) => Some(duration),
        Err(_) => {
            debug!(header_value, "Retry-After date is in the past, returning zero");
            Some(Duration::ZERO)
        }
    }
}
