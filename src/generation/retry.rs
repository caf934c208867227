//! Retry logic for generation calls

use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    /// Wait after attempt `n` is `step * n`
    pub step: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            step: Duration::from_secs(10),
        }
    }
}

/// Retry policy that determines whether to retry and how long to wait
pub trait RetryPolicy<E> {
    fn max_attempts(&self) -> u32;
    fn is_retryable(&self, error: &E) -> bool;
    fn delay(&self, attempt: u32) -> Duration;
}

/// Why a retried operation gave up
#[derive(Debug)]
pub enum RetryError<E> {
    /// A non-retryable error; returned from the attempt that produced it
    Fatal { attempt: u32, error: E },
    /// Every attempt failed with a retryable error
    Exhausted { attempts: u32, last: E },
}

/// Errors that expose whether the service asked us to slow down.
pub trait RateLimitSignal {
    fn is_rate_limited(&self) -> bool;
}

/// Retries rate-limited attempts only, waiting linearly longer each time.
pub struct RateLimitBackoff {
    config: RetryConfig,
}

impl RateLimitBackoff {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl<E: RateLimitSignal> RetryPolicy<E> for RateLimitBackoff {
    fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    fn is_retryable(&self, error: &E) -> bool {
        error.is_rate_limited()
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.config.step.saturating_mul(attempt)
    }
}

/// Retry an async operation with a given policy.
///
/// `on_retry` runs before each wait with the attempt number that failed.
pub async fn retry_async_with_policy<T, E, P, F, Fut>(
    mut operation: F,
    policy: &P,
    operation_name: &str,
    mut on_retry: impl FnMut(u32, &E),
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: RetryPolicy<E> + ?Sized,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) if !policy.is_retryable(&error) => {
                return Err(RetryError::Fatal { attempt, error });
            }
            Err(error) if attempt >= max_attempts => {
                warn!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %error,
                    "giving up after retryable failures"
                );
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }
            Err(error) => {
                let delay = policy.delay(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying async operation after delay"
                );
                on_retry(attempt, &error);
                tokio::time::sleep(delay).await;
            }
        }
    }
}
