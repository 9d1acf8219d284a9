//! Retry with exponential backoff for bulk submissions

use std::future::Future;
use std::time::Duration;

use crate::error::BackendError;

/// Retry budget for one submission.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure
    pub max_retries: u32,
    /// Delay before the first retry; doubles each time
    pub base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base: Duration::from_secs(1),
        }
    }
}

/// Exponential backoff: base·2^(attempt-1) (1s, 2s, 4s, ... for a 1s base)
pub fn backoff_duration(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

/// Run `attempt_fn` until it succeeds, fails with a non-retryable error, or
/// the retry budget is spent.
///
/// On failure returns the number of attempts made alongside the last error.
pub async fn retry_with_backoff<T, F, Fut>(
    label: &str,
    policy: RetryPolicy,
    mut attempt_fn: F,
) -> Result<T, (u32, BackendError)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let mut attempt = 0u32;
    loop {
        match attempt_fn().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < policy.max_retries && e.is_retryable() => {
                attempt += 1;
                let delay = backoff_duration(policy.base, attempt);
                log::debug!(
                    "{label}: attempt {attempt}/{} failed: {e}, retrying in {delay:?}",
                    policy.max_retries
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err((attempt + 1, e)),
        }
    }
}
