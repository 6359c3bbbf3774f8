//! Bounded retry with linear backoff for one-shot requests.
//!
//! The policy is independent of HTTP: [`retry_with_backoff`] drives any async attempt
//! closure, bounding each attempt by a deadline and sleeping `BASE_DELAY * k` after the
//! k-th failure.

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_RETRIES, CLIENT_RETRY_BACKOFF};

/// Delay unit for linear backoff.
pub const BASE_DELAY: Duration = Duration::from_millis(500);

/// Default number of retries after the first attempt.
pub const DEFAULT_RETRIES: u32 = 1;

/// Default per-attempt deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry and timeout settings for a one-shot request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// Attempts made after the first one fails.
    pub retries: u32,

    /// Deadline for each individual attempt.
    pub timeout: Duration,
}

impl RequestOptions {
    /// Creates options with the given retry count and per-attempt deadline.
    pub fn new(retries: u32, timeout: Duration) -> Self {
        Self { retries, timeout }
    }

    /// Sets the retry count.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the per-attempt deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the per-attempt deadline in milliseconds.
    pub fn with_timeout_ms(self, timeout_ms: u64) -> Self {
        self.with_timeout(Duration::from_millis(timeout_ms))
    }

    /// Total number of attempts, `retries + 1`.
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay to wait after failed attempt `attempt` (1-indexed).
    pub fn backoff(&self, attempt: u32) -> Duration {
        BASE_DELAY * attempt
    }

    /// Rejects a zero deadline.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::validation(
                "timeout must be greater than zero",
                Some("timeout".to_string()),
            ));
        }
        Ok(())
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new(DEFAULT_RETRIES, DEFAULT_TIMEOUT)
    }
}

/// Runs `attempt` until it succeeds or `options.attempts()` attempts have failed.
///
/// The closure receives the 1-indexed attempt number.  An attempt that outlives
/// `options.timeout` is dropped, which aborts whatever it was doing, and counts as a
/// failure.  The first success is returned immediately.  When every attempt fails the
/// result is [`Error::RequestFailed`] carrying the last cause.
pub async fn retry_with_backoff<T, F, Fut>(options: &RequestOptions, mut attempt: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    options.validate()?;
    let attempts = options.attempts();
    let mut k = 1;
    loop {
        let outcome = match tokio::time::timeout(options.timeout, attempt(k)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::timeout(
                format!("attempt {k} did not finish in time"),
                Some(options.timeout.as_secs_f64()),
            )),
        };
        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.is_retryable() || k >= attempts {
            return Err(Error::request_failed(k, err));
        }
        let delay = options.backoff(k);
        tracing::warn!(attempt = k, delay_ms = delay.as_millis() as u64, error = %err, "retrying request");
        CLIENT_REQUEST_RETRIES.click();
        CLIENT_RETRY_BACKOFF.add(delay.as_secs_f64());
        tokio::time::sleep(delay).await;
        k += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tokio::time::Instant;

    fn whole_millis(d: Duration) -> Duration {
        Duration::from_millis(d.as_millis() as u64)
    }

    #[test]
    fn backoff_is_linear() {
        let options = RequestOptions::default();
        assert_eq!(options.backoff(1), Duration::from_millis(500));
        assert_eq!(options.backoff(2), Duration::from_millis(1000));
        assert_eq!(options.backoff(3), Duration::from_millis(1500));
    }

    #[test]
    fn zero_timeout_is_invalid() {
        let options = RequestOptions::new(0, Duration::ZERO);
        assert!(options.validate().unwrap_err().is_validation());
    }

    #[tokio::test(start_paused = true)]
    async fn third_attempt_succeeds_after_linear_delays() {
        let options = RequestOptions::new(2, Duration::from_secs(5));
        let calls = RefCell::new(Vec::new());
        let start = Instant::now();

        let result = retry_with_backoff(&options, |k| {
            calls.borrow_mut().push(whole_millis(start.elapsed()));
            async move {
                if k < 3 {
                    Err(Error::api(503, "warming up"))
                } else {
                    Ok(k)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(
            calls.into_inner(),
            vec![
                Duration::ZERO,
                Duration::from_millis(500),
                Duration::from_millis(1500),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_fails_after_one_attempt_without_delay() {
        let options = RequestOptions::new(0, Duration::from_secs(5));
        let mut calls = 0;
        let start = Instant::now();

        let err = retry_with_backoff(&options, |_| {
            calls += 1;
            async { Err::<(), _>(Error::api(500, "boom")) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls, 1);
        assert_eq!(whole_millis(start.elapsed()), Duration::ZERO);
        assert!(err.is_request_failed());
        assert_eq!(err.to_string(), "HTTP 500: boom");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempt_times_out_and_is_retried() {
        let options = RequestOptions::new(1, Duration::from_millis(100));
        let start = Instant::now();

        let result = retry_with_backoff(&options, |k| async move {
            if k == 1 {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok(k)
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        // 100ms deadline on the first attempt, then 500ms backoff.
        assert_eq!(whole_millis(start.elapsed()), Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_report_last_cause() {
        let options = RequestOptions::new(1, Duration::from_millis(100));

        let err = retry_with_backoff(&options, |k| async move {
            if k == 1 {
                Err::<(), _>(Error::api(500, "first"))
            } else {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(())
            }
        })
        .await
        .unwrap_err();

        match err {
            Error::RequestFailed { attempts, source } => {
                assert_eq!(attempts, 2);
                assert!(source.is_timeout());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn local_failures_are_not_retried() {
        let options = RequestOptions::new(3, Duration::from_secs(1));
        let mut calls = 0;

        let err = retry_with_backoff(&options, |_| {
            calls += 1;
            async { Err::<(), _>(Error::validation("bad body", None)) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls, 1);
        assert!(err.is_request_failed());
    }
}
