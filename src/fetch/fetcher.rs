//! Rate-limited, retrying wrapper around a [`Marketplace`].
//!
//! Every call goes through [`RateLimiter::acquire`] first. Throttling and
//! transient failures are retried with capped exponential backoff until the
//! policy's retry budget runs out, then surfaced as one terminal
//! [`FetchError`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument};

use super::rate_limiter::{RateLimiter, RateLimiterState, parse_retry_after};
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
use crate::marketplace::{Marketplace, MarketplaceError, PageRequest, RawDataset};

/// Default minimum spacing between marketplace calls (1 second).
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(1);

/// Terminal errors from [`RateLimitedFetcher::fetch`].
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The marketplace kept throttling until the retry budget was spent.
    #[error("marketplace rate limit still in effect after {attempts} attempts: {source}")]
    RateLimited {
        /// Attempts made, including the first.
        attempts: u32,
        /// The last failure.
        #[source]
        source: MarketplaceError,
    },

    /// Transient failures persisted until the retry budget was spent.
    #[error("marketplace unavailable after {attempts} attempts: {source}")]
    Unavailable {
        /// Attempts made, including the first.
        attempts: u32,
        /// The last failure.
        #[source]
        source: MarketplaceError,
    },

    /// The marketplace rejected the request in a way retries cannot fix.
    #[error("marketplace request failed: {source}")]
    Rejected {
        /// The failure.
        #[source]
        source: MarketplaceError,
    },
}

impl FetchError {
    /// Returns whether the terminal cause was throttling.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Returns the number of attempts made, when the error ended a retry loop.
    #[must_use]
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::RateLimited { attempts, .. } | Self::Unavailable { attempts, .. } => {
                Some(*attempts)
            }
            Self::Rejected { .. } => None,
        }
    }
}

/// Marketplace access with enforced spacing and retry-with-backoff.
///
/// Owns the only [`RateLimiter`] for its marketplace; share the fetcher
/// itself through `Arc` so all requests see the same state.
pub struct RateLimitedFetcher {
    marketplace: Arc<dyn Marketplace>,
    limiter: RateLimiter,
    policy: RetryPolicy,
}

impl std::fmt::Debug for RateLimitedFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedFetcher")
            .field("marketplace", &self.marketplace.name())
            .field("limiter", &self.limiter)
            .field("policy", &self.policy)
            .finish()
    }
}

impl RateLimitedFetcher {
    /// Creates a fetcher with `min_delay` spacing and the given retry policy.
    #[must_use]
    pub fn new(
        marketplace: Arc<dyn Marketplace>,
        min_delay: Duration,
        policy: RetryPolicy,
    ) -> Self {
        let limiter = RateLimiter::new(min_delay, policy.backoff());
        info!(
            marketplace = marketplace.name(),
            min_delay_ms = min_delay.as_millis(),
            max_retries = policy.max_retries(),
            base_delay_ms = policy.backoff().base().as_millis(),
            max_delay_ms = policy.backoff().max().as_millis(),
            max_jitter_ms = policy.max_jitter().as_millis(),
            "marketplace fetcher configured"
        );
        Self {
            marketplace,
            limiter,
            policy,
        }
    }

    /// Returns a copy of the limiter state.
    pub async fn state(&self) -> RateLimiterState {
        self.limiter.state().await
    }

    /// Fetches one page, honoring spacing and retrying transient failures.
    ///
    /// # Errors
    ///
    /// - [`FetchError::RateLimited`] when throttling outlasts the retry budget
    /// - [`FetchError::Unavailable`] when transient failures outlast it
    /// - [`FetchError::Rejected`] immediately for permanent failures
    #[instrument(
        skip(self),
        fields(marketplace = self.marketplace.name(), term = %request.term, page = request.page)
    )]
    pub async fn fetch(&self, request: &PageRequest) -> Result<Vec<RawDataset>, FetchError> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.limiter.acquire().await;
            debug!(attempt, "calling marketplace");

            let error = match self.marketplace.list_datasets(request).await {
                Ok(records) => {
                    self.limiter.record_success().await;
                    debug!(attempt, count = records.len(), "marketplace call succeeded");
                    return Ok(records);
                }
                Err(error) => error,
            };

            let failure_type = classify_error(&error);
            if !failure_type.is_retryable() {
                debug!(error = %error, ?failure_type, "not retrying marketplace call");
                return Err(FetchError::Rejected { source: error });
            }

            let backoff = self.limiter.record_failure().await;

            match self.policy.should_retry(failure_type, attempt) {
                RetryDecision::Retry { next_attempt } => {
                    let retry_after = if failure_type == FailureType::RateLimited {
                        retry_after_delay(&error)
                    } else {
                        None
                    };
                    let delay = retry_after.map_or(backoff, |server| server.max(backoff))
                        + self.policy.jitter();

                    info!(
                        attempt = next_attempt,
                        max_attempts = self.policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        using_retry_after = retry_after.is_some_and(|server| server > backoff),
                        error = %error,
                        "retrying marketplace call"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(%reason, attempt, "giving up on marketplace call");
                    return Err(if failure_type == FailureType::RateLimited {
                        FetchError::RateLimited {
                            attempts: attempt,
                            source: error,
                        }
                    } else {
                        FetchError::Unavailable {
                            attempts: attempt,
                            source: error,
                        }
                    });
                }
            }
        }
    }
}

/// Extracts the server-requested delay from a 429 response, if any.
fn retry_after_delay(error: &MarketplaceError) -> Option<Duration> {
    let header = match error {
        MarketplaceError::HttpStatus { retry_after, .. } => retry_after.as_deref()?,
        _ => return None,
    };
    let delay = parse_retry_after(header)?;
    debug!(retry_after = %header, delay_ms = delay.as_millis(), "marketplace sent Retry-After");
    Some(delay)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::fetch::Backoff;
    use crate::query::SortBy;

    /// Replays scripted outcomes and records when each call arrived.
    struct ScriptedMarketplace {
        outcomes: Mutex<VecDeque<Result<Vec<RawDataset>, MarketplaceError>>>,
        calls: Mutex<Vec<Instant>>,
        latency: Duration,
    }

    impl ScriptedMarketplace {
        fn new(outcomes: Vec<Result<Vec<RawDataset>, MarketplaceError>>) -> Arc<Self> {
            Self::with_latency(outcomes, Duration::ZERO)
        }

        fn with_latency(
            outcomes: Vec<Result<Vec<RawDataset>, MarketplaceError>>,
            latency: Duration,
        ) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(Vec::new()),
                latency,
            })
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Marketplace for ScriptedMarketplace {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn list_datasets(
            &self,
            _request: &PageRequest,
        ) -> Result<Vec<RawDataset>, MarketplaceError> {
            self.calls.lock().unwrap().push(Instant::now());
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn throttled() -> Result<Vec<RawDataset>, MarketplaceError> {
        Err(MarketplaceError::http_status("https://example.com/datasets/list", 429))
    }

    fn dataset(reference: &str) -> RawDataset {
        RawDataset {
            reference: reference.to_string(),
            title: reference.to_string(),
            ..RawDataset::default()
        }
    }

    fn request() -> PageRequest {
        PageRequest::new("titanic", 1, SortBy::Hottest)
    }

    fn fetcher(
        marketplace: Arc<ScriptedMarketplace>,
        min_delay: Duration,
        retries: u32,
    ) -> RateLimitedFetcher {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(1000));
        RateLimitedFetcher::new(marketplace, min_delay, RetryPolicy::new(retries, backoff))
    }

    fn gaps(times: &[Instant]) -> Vec<Duration> {
        times.windows(2).map(|pair| pair[1] - pair[0]).collect()
    }

    #[tokio::test]
    async fn test_fetch_success_returns_records() {
        let marketplace = ScriptedMarketplace::new(vec![Ok(vec![dataset("a/b")])]);
        let fetcher = fetcher(Arc::clone(&marketplace), Duration::ZERO, 3);

        let records = fetcher.fetch(&request()).await.unwrap();
        assert_eq!(records, vec![dataset("a/b")]);
        assert_eq!(marketplace.call_times().len(), 1);
    }

    #[tokio::test]
    async fn test_backoff_delay_before_each_retry_doubles() {
        tokio::time::pause();

        let marketplace = ScriptedMarketplace::new(vec![
            throttled(),
            throttled(),
            throttled(),
            Ok(vec![dataset("a/b")]),
        ]);
        let fetcher = fetcher(Arc::clone(&marketplace), Duration::ZERO, 3);

        fetcher.fetch(&request()).await.unwrap();

        let expected = [200, 400, 800].map(Duration::from_millis);
        let observed = gaps(&marketplace.call_times());
        assert_eq!(observed.len(), 3);
        for (gap, want) in observed.iter().zip(expected) {
            assert!(
                *gap >= want && *gap < want + Duration::from_millis(5),
                "expected ~{want:?}, got {gap:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_success_after_failures_resets_state() {
        tokio::time::pause();

        let marketplace = ScriptedMarketplace::new(vec![throttled(), throttled(), Ok(Vec::new())]);
        let fetcher = fetcher(marketplace, Duration::ZERO, 3);

        fetcher.fetch(&request()).await.unwrap();

        let state = fetcher.state().await;
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.current_backoff, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_exhausted_throttling_is_terminal_rate_limit_error() {
        tokio::time::pause();

        let marketplace = ScriptedMarketplace::new(vec![
            throttled(),
            throttled(),
            throttled(),
            throttled(),
            Ok(vec![dataset("never/reached")]),
        ]);
        let fetcher = fetcher(Arc::clone(&marketplace), Duration::ZERO, 3);

        let err = fetcher.fetch(&request()).await.unwrap_err();

        assert!(err.is_rate_limited(), "unexpected error: {err}");
        assert_eq!(err.attempts(), Some(4));
        assert_eq!(marketplace.call_times().len(), 4, "no attempt after the 3rd retry");
    }

    #[tokio::test]
    async fn test_exhausted_server_errors_are_unavailable() {
        tokio::time::pause();

        let marketplace = ScriptedMarketplace::new(vec![
            Err(MarketplaceError::http_status("u", 503)),
            Err(MarketplaceError::timeout("u")),
        ]);
        let fetcher = fetcher(Arc::clone(&marketplace), Duration::ZERO, 1);

        let err = fetcher.fetch(&request()).await.unwrap_err();
        assert!(matches!(err, FetchError::Unavailable { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried_and_state_untouched() {
        let marketplace =
            ScriptedMarketplace::new(vec![Err(MarketplaceError::http_status("u", 404))]);
        let fetcher = fetcher(Arc::clone(&marketplace), Duration::ZERO, 3);

        let err = fetcher.fetch(&request()).await.unwrap_err();

        assert!(matches!(err, FetchError::Rejected { .. }));
        assert_eq!(marketplace.call_times().len(), 1);
        assert_eq!(fetcher.state().await.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_retry_after_longer_than_backoff_is_honored() {
        tokio::time::pause();

        let marketplace = ScriptedMarketplace::new(vec![
            Err(MarketplaceError::http_status_with_retry_after(
                "u",
                429,
                Some("2".to_string()),
            )),
            Ok(Vec::new()),
        ]);
        let fetcher = fetcher(Arc::clone(&marketplace), Duration::ZERO, 3);

        fetcher.fetch(&request()).await.unwrap();

        let observed = gaps(&marketplace.call_times());
        assert!(observed[0] >= Duration::from_secs(2), "got {:?}", observed[0]);
    }

    #[tokio::test]
    async fn test_sequential_fetches_respect_min_delay() {
        tokio::time::pause();

        let marketplace = ScriptedMarketplace::new(Vec::new());
        let fetcher = fetcher(Arc::clone(&marketplace), Duration::from_millis(300), 3);

        for _ in 0..4 {
            fetcher.fetch(&request()).await.unwrap();
        }

        for gap in gaps(&marketplace.call_times()) {
            assert!(gap >= Duration::from_millis(300), "gap too short: {gap:?}");
        }
    }

    #[tokio::test]
    async fn test_concurrent_fetches_respect_min_delay() {
        tokio::time::pause();

        let marketplace = ScriptedMarketplace::new(Vec::new());
        let fetcher = Arc::new(fetcher(Arc::clone(&marketplace), Duration::from_millis(300), 3));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let fetcher = Arc::clone(&fetcher);
            handles.push(tokio::spawn(async move { fetcher.fetch(&request()).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut times = marketplace.call_times();
        times.sort();
        assert_eq!(times.len(), 5);
        for gap in gaps(&times) {
            assert!(gap >= Duration::from_millis(300), "gap too short: {gap:?}");
        }
    }

    #[tokio::test]
    async fn test_concurrent_fetch_returns_without_waiting_for_later_slots() {
        tokio::time::pause();

        let marketplace = ScriptedMarketplace::with_latency(Vec::new(), Duration::from_millis(10));
        let fetcher = Arc::new(fetcher(Arc::clone(&marketplace), Duration::from_secs(1), 3));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let fetcher = Arc::clone(&fetcher);
            handles.push(tokio::spawn(async move {
                fetcher.fetch(&request()).await.unwrap();
                start.elapsed()
            }));
        }
        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap());
        }
        finished.sort();

        // Each request finishes right after its own slot, not after the last one
        for (index, done) in finished.iter().enumerate() {
            let slot = Duration::from_secs(u64::try_from(index).unwrap());
            let earliest = slot + Duration::from_millis(10);
            assert!(
                *done >= earliest && *done < earliest + Duration::from_millis(40),
                "request in slot {slot:?} finished at {done:?}"
            );
        }
        assert_eq!(fetcher.state().await.consecutive_failures, 0);
    }

    #[test]
    fn test_fetch_error_display_is_verbatim_upstream_text() {
        let err = FetchError::RateLimited {
            attempts: 4,
            source: MarketplaceError::http_status("https://example.com/datasets/list", 429),
        };
        let msg = err.to_string();
        assert!(msg.contains("4 attempts"), "{msg}");
        assert!(msg.contains("HTTP 429"), "{msg}");
    }
}
