//! Retry decisions for failed requests.
//!
//! The transport never retries on its own; callers that orchestrate requests
//! wrap them in `RetryPolicy::run`. Each call carries its own attempt count,
//! so concurrent requests never share a retry budget.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::ApiError;

/// Maximum attempts per request, counting the first one.
const MAX_ATTEMPTS: u32 = 3;

/// Initial backoff delay in milliseconds.
/// 1 second is polite to the server while not making users wait too long.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Upper bound on the delay between attempts.
const MAX_BACKOFF_MS: u64 = 30_000;

/// Whether a request that has failed `attempt` times (1-based) should be tried
/// again. Only server-side and network failures are retried, and never past
/// the third attempt.
pub fn should_retry(attempt: u32, error: &ApiError) -> bool {
    RetryPolicy::default().should_retry(attempt, error)
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    pub fn should_retry(&self, attempt: u32, error: &ApiError) -> bool {
        attempt < self.max_attempts && error.is_retriable()
    }

    /// Delay before the retry that follows failed attempt `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds or the policy gives up, returning the last error.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if self.should_retry(attempt, &e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt = attempt,
                        status = ?e.status(),
                        backoff_ms = delay.as_millis() as u64,
                        error = %e,
                        "Request failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn status_error(code: u16) -> ApiError {
        ApiError::from_status(StatusCode::from_u16(code).unwrap(), &json!({}))
    }

    #[test]
    fn test_should_retry_server_errors_until_third_attempt() {
        let err = status_error(500);
        assert!(should_retry(1, &err));
        assert!(should_retry(2, &err));
        assert!(!should_retry(3, &err));
        assert!(!should_retry(4, &err));
    }

    #[test]
    fn test_should_not_retry_client_errors() {
        for attempt in 0..5 {
            assert!(!should_retry(attempt, &status_error(404)));
            assert!(!should_retry(attempt, &status_error(401)));
            assert!(!should_retry(attempt, &status_error(400)));
        }
    }

    #[test]
    fn test_should_not_retry_local_request_errors() {
        let err = ApiError::InvalidRequest("unserializable body".to_string());
        assert!(!should_retry(1, &err));
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_gives_up_after_three_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), ApiError> = RetryPolicy::default()
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(status_error(503)) }
            })
            .await;

        assert!(matches!(result, Err(ApiError::Server { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::default()
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(status_error(502))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_does_not_retry_not_found() {
        let calls = AtomicU32::new(0);
        let result: Result<(), ApiError> = RetryPolicy::default()
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(status_error(404)) }
            })
            .await;

        assert!(matches!(result, Err(ApiError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
