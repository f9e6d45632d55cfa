//! Retry with exponential backoff.
//!
//! Retries wrap whole operations (for example "open a session"), never
//! individual protocol commands: a half-finished mail transaction cannot be
//! resumed.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. 0 disables retrying.
    pub max_retries: u32,

    /// Delay before the first retry. Doubles on each further retry.
    pub base_delay: Duration,

    /// Upper bound on a single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(2000),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with `max_retries` and `base_delay`.
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry - 1)`, capped.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Runs `operation` until it succeeds, fails with an error `should_retry`
    /// rejects, or the retry budget is spent. Returns the last result.
    ///
    /// Cancellation during a backoff delay stops retrying and returns the
    /// last error.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
        should_retry: P,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempt > self.max_retries || !should_retry(&err) {
                return Err(err);
            }

            let delay = self.delay_for(attempt);
            tracing::warn!(
                attempt,
                max_retries = self.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "attempt failed, retrying"
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(err),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(2));
        assert_eq!(policy.delay_for(5), Duration::from_secs(5));
        assert_eq!(policy.delay_for(200), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        let calls = Cell::new(0);

        let result: Result<&str, String> = policy
            .run(
                &CancellationToken::new(),
                |attempt| {
                    calls.set(calls.get() + 1);
                    async move {
                        if attempt < 3 {
                            Err(format!("attempt {attempt} failed"))
                        } else {
                            Ok("connected")
                        }
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result.unwrap(), "connected");
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_budget() {
        let policy = RetryPolicy::new(2, Duration::from_millis(100));
        let calls = Cell::new(0);

        let result: Result<(), String> = policy
            .run(
                &CancellationToken::new(),
                |_| {
                    calls.set(calls.get() + 1);
                    async { Err("refused".to_string()) }
                },
                |_| true,
            )
            .await;

        assert_eq!(result.unwrap_err(), "refused");
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        let calls = Cell::new(0);

        let result: Result<(), String> = policy
            .run(
                &CancellationToken::new(),
                |_| {
                    calls.set(calls.get() + 1);
                    async { Err("535 bad credentials".to_string()) }
                },
                |err| !err.starts_with('5'),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_backoff() {
        let policy = RetryPolicy::new(5, Duration::from_secs(60));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = Cell::new(0);

        let result: Result<(), String> = policy
            .run(
                &cancel,
                |_| {
                    calls.set(calls.get() + 1);
                    async { Err("timeout".to_string()) }
                },
                |_| true,
            )
            .await;

        assert_eq!(result.unwrap_err(), "timeout");
        assert_eq!(calls.get(), 1);
    }
}
