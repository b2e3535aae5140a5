//! Retry classification and exponential backoff for marketplace calls.
//!
//! When a marketplace call fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - Temporary failures that may succeed on retry
//! - [`FailureType::RateLimited`] - Marketplace throttling (HTTP 429)
//! - [`FailureType::NeedsAuth`] - Credentials missing or rejected
//! - [`FailureType::Permanent`] - Failures that won't succeed regardless of retries
//!
//! The [`RetryPolicy`] then decides whether another attempt is allowed, and
//! [`Backoff`] computes how long to wait given the current failure streak.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use dataset_search_core::fetch::{Backoff, FailureType, RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(
//!     policy.should_retry(FailureType::RateLimited, 1),
//!     RetryDecision::Retry { next_attempt: 2 }
//! );
//!
//! let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(32));
//! assert_eq!(backoff.delay_for(3), Duration::from_secs(8));
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use crate::marketplace::MarketplaceError;

/// Default maximum retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff (1 second).
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (32 seconds).
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Classification of marketplace failure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: network timeout, 5xx server errors, connection refused.
    Transient,

    /// Permanent failure that won't succeed regardless of retries.
    ///
    /// Examples: 400 Bad Request, 404, undecodable response body.
    Permanent,

    /// Credentials missing or rejected (401/403).
    NeedsAuth,

    /// Marketplace throttling (HTTP 429).
    RateLimited,
}

impl FailureType {
    /// Returns whether this failure type is worth retrying.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::RateLimited)
    }
}

/// Decision on whether to retry a failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry; `next_attempt` is 1-indexed (first retry is attempt 2).
    Retry { next_attempt: u32 },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Capped exponential backoff: `min(base × 2^failures, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_DELAY,
            max: DEFAULT_MAX_DELAY,
        }
    }
}

impl Backoff {
    /// Creates a backoff. `max` is raised to `base` if smaller.
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    /// Base delay; also the reset value after a success.
    #[must_use]
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Maximum delay cap.
    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay to wait after `consecutive_failures` failures in a row.
    ///
    /// Saturates instead of overflowing for long failure streaks.
    #[must_use]
    pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(consecutive_failures);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Retry configuration for marketplace calls.
///
/// # Default Values
///
/// - `max_retries`: 3 (so at most 4 attempts)
/// - backoff: 1 second base, 32 second cap
/// - `max_jitter`: zero
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the initial attempt.
    max_retries: u32,

    /// Backoff curve.
    backoff: Backoff,

    /// Upper bound of random jitter added on top of each backoff delay.
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Backoff::default(),
            max_jitter: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy with custom settings.
    #[must_use]
    pub fn new(max_retries: u32, backoff: Backoff) -> Self {
        Self {
            max_retries,
            backoff,
            max_jitter: Duration::ZERO,
        }
    }

    /// Creates a policy with custom `max_retries`, using defaults for other settings.
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Adds random jitter in `0..=max_jitter` to every backoff delay.
    #[must_use]
    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Returns the jitter upper bound.
    #[must_use]
    pub fn max_jitter(&self) -> Duration {
        self.max_jitter
    }

    /// Returns the configured retry count.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the total number of attempts (initial call plus retries).
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Returns the backoff curve.
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Determines whether to retry after `attempt` (1-indexed) failed.
    #[instrument(skip(self), fields(max_retries = self.max_retries))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        match failure_type {
            FailureType::Permanent => {
                return RetryDecision::DoNotRetry {
                    reason: "permanent failure - retry would not help".to_string(),
                };
            }
            FailureType::NeedsAuth => {
                return RetryDecision::DoNotRetry {
                    reason: "marketplace rejected credentials - check KAGGLE_USERNAME/KAGGLE_KEY"
                        .to_string(),
                };
            }
            FailureType::Transient | FailureType::RateLimited => {}
        }

        if attempt >= self.max_attempts() {
            debug!(attempt, max_retries = self.max_retries, "retries exhausted");
            return RetryDecision::DoNotRetry {
                reason: format!("max retries ({}) exhausted", self.max_retries),
            };
        }

        RetryDecision::Retry {
            next_attempt: attempt + 1,
        }
    }

    /// Random jitter between zero and the configured maximum.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        let mut rng = rand::thread_rng();
        let jitter_ms = rng.gen_range(0..=self.max_jitter.as_millis() as u64);
        Duration::from_millis(jitter_ms)
    }
}

/// Classifies a marketplace error for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | HTTP 429 | RateLimited |
/// | HTTP 401, 403 | NeedsAuth |
/// | HTTP 408, 5xx | Transient |
/// | other HTTP 4xx | Permanent |
/// | Timeout | Transient |
/// | Network (TLS/certificate) | Permanent |
/// | Network (other) | Transient |
/// | Decode, InvalidUrl, Credentials, ClientBuild | Permanent |
#[instrument]
pub fn classify_error(error: &MarketplaceError) -> FailureType {
    match error {
        MarketplaceError::HttpStatus { status, .. } => classify_http_status(*status),
        MarketplaceError::Timeout { .. } => FailureType::Transient,
        MarketplaceError::Network { source, .. } => {
            if is_tls_error(source) {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }
        MarketplaceError::Decode { .. }
        | MarketplaceError::InvalidUrl { .. }
        | MarketplaceError::Credentials { .. }
        | MarketplaceError::ClientBuild { .. } => FailureType::Permanent,
    }
}

#[allow(clippy::match_same_arms)]
fn classify_http_status(status: u16) -> FailureType {
    match status {
        401 => FailureType::NeedsAuth,   // Unauthorized
        403 => FailureType::NeedsAuth,   // Forbidden
        408 => FailureType::Transient,   // Request Timeout
        429 => FailureType::RateLimited, // Too Many Requests
        status if (400..500).contains(&status) => FailureType::Permanent,
        status if (500..600).contains(&status) => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}

fn is_tls_error(error: &reqwest::Error) -> bool {
    let error_string = error.to_string().to_lowercase();
    error_string.contains("certificate")
        || error_string.contains("tls")
        || error_string.contains("ssl")
        || error_string.contains("handshake")
}
