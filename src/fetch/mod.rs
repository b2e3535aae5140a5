//! Rate-limited marketplace fetching.
//!
//! - [`RateLimitedFetcher`] - Wraps a [`crate::marketplace::Marketplace`] with spacing and retries
//! - [`RateLimiter`] - Owns [`RateLimiterState`] behind one mutex
//! - [`RetryPolicy`] / [`Backoff`] - Retry budget and capped exponential delay
//! - [`classify_error`] - Maps a marketplace error to a [`FailureType`]

mod fetcher;
pub mod rate_limiter;
mod retry;

pub use fetcher::{DEFAULT_MIN_DELAY, FetchError, RateLimitedFetcher};
pub use rate_limiter::{RateLimiter, RateLimiterState, parse_retry_after};
pub use retry::{
    Backoff, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES, FailureType,
    RetryDecision, RetryPolicy, classify_error,
};
