//! Deadline-bounded retry for connection establishment.
//!
//! A freshly provisioned server is often unreachable for a while after the
//! orchestrator considers it created. Connection attempts are therefore
//! retried with exponential backoff until they succeed, a non-transient error
//! is seen, the time budget runs out, or the host cancels.

use crate::constants::{RETRY_INITIAL_DELAY, RETRY_MAX_DELAY, RETRY_MULTIPLIER};
use crate::error::ProviderError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total time budget across all attempts and delays.
    pub timeout: Duration,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier (for exponential backoff).
    pub multiplier: f64,
    /// Whether to add jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::connection(crate::constants::DEFAULT_CONNECT_RETRY_TIMEOUT)
    }
}

impl RetryConfig {
    /// Create a retry config for connection establishment with the given budget.
    pub fn connection(timeout: Duration) -> Self {
        Self {
            timeout,
            initial_delay: RETRY_INITIAL_DELAY,
            max_delay: RETRY_MAX_DELAY,
            multiplier: RETRY_MULTIPLIER,
            jitter: true,
        }
    }

    /// Disable jitter, making delays deterministic.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Calculate the delay after a given failed attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay_ms = self.initial_delay.as_millis() as f64
            * self.multiplier.powi(attempt.saturating_sub(1) as i32);

        let capped_delay_ms = base_delay_ms.min(self.max_delay.as_millis() as f64);

        let final_delay_ms = if self.jitter {
            // +/- 25%
            capped_delay_ms * rand::thread_rng().gen_range(0.75..=1.25)
        } else {
            capped_delay_ms
        };

        Duration::from_millis(final_delay_ms as u64)
    }
}

/// Result of a retry operation.
#[derive(Debug)]
pub struct RetryResult<T> {
    /// The successful result, if any.
    pub value: Option<T>,
    /// Number of attempts made.
    pub attempts: u32,
    /// Total time spent (including delays).
    pub total_duration: Duration,
    /// The terminal error, if the operation failed.
    pub last_error: Option<ProviderError>,
}

impl<T> RetryResult<T> {
    /// Check if the operation succeeded.
    pub fn is_success(&self) -> bool {
        self.value.is_some()
    }

    /// Convert to a standard Result.
    pub fn into_result(self) -> Result<T, ProviderError> {
        match self.value {
            Some(v) => Ok(v),
            None => Err(self
                .last_error
                .unwrap_or_else(|| ProviderError::internal("Retry failed with no error captured"))),
        }
    }

    fn success(value: T, attempts: u32, start: Instant) -> Self {
        Self {
            value: Some(value),
            attempts,
            total_duration: start.elapsed(),
            last_error: None,
        }
    }

    fn failure(error: ProviderError, attempts: u32, start: Instant) -> Self {
        Self {
            value: None,
            attempts,
            total_duration: start.elapsed(),
            last_error: Some(error),
        }
    }
}

/// Execute an async operation until it succeeds or the budget is exhausted.
///
/// Transient errors (see [`ProviderError::is_transient`]) are retried; any
/// other error ends the loop immediately. Each attempt is bounded by the time
/// left in the budget and delays never sleep past the deadline. When the
/// deadline passes the result is [`ProviderError::ConnectTimeout`] wrapping
/// the last attempt's error. Cancellation through `cancel` aborts the current
/// attempt or delay and yields [`ProviderError::Cancelled`].
pub async fn retry_until_deadline<F, Fut, T>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    operation: F,
) -> RetryResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let start = Instant::now();
    let deadline = start + config.timeout;
    let timeout_secs = config.timeout.as_secs();
    let mut attempt: u32 = 0;
    let mut last_error: Option<ProviderError> = None;

    loop {
        attempt += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return RetryResult::failure(
                    ProviderError::cancelled("connection attempt cancelled by host"),
                    attempt,
                    start,
                );
            }
            outcome = timeout(remaining, operation()) => outcome,
        };

        match outcome {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    debug!("Operation succeeded on attempt {}", attempt);
                }
                return RetryResult::success(value, attempt, start);
            }
            Ok(Err(e)) if !e.is_transient() => {
                debug!("Non-transient error, not retrying: {}", e);
                return RetryResult::failure(e, attempt, start);
            }
            Ok(Err(e)) => {
                warn!(
                    "Transient error on attempt {} ({:?} elapsed of {:?}): {}",
                    attempt,
                    start.elapsed(),
                    config.timeout,
                    e
                );
                last_error = Some(e);
            }
            Err(_) => {
                warn!("Attempt {} did not finish within the retry budget", attempt);
                if last_error.is_none() {
                    last_error = Some(ProviderError::connection(
                        "connection attempt did not complete before the retry deadline",
                    ));
                }
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            let last = last_error.unwrap_or_else(|| ProviderError::connection("no attempt completed"));
            return RetryResult::failure(ProviderError::connect_timeout(timeout_secs, last), attempt, start);
        }

        let delay = config.delay_for_attempt(attempt).min(remaining);
        debug!("Retrying in {:?}", delay);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return RetryResult::failure(
                    ProviderError::cancelled("connection retry cancelled by host"),
                    attempt,
                    start,
                );
            }
            _ = sleep(delay) => {}
        }

        if Instant::now() >= deadline {
            let last = last_error.unwrap_or_else(|| ProviderError::connection("no attempt completed"));
            return RetryResult::failure(ProviderError::connect_timeout(timeout_secs, last), attempt, start);
        }
    }
}
