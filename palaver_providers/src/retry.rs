use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Longest pause between two attempts.
pub const MAX_DELAY: Duration = Duration::from_secs(10);

/// Retry schedule for operations that are safe to repeat.
///
/// Only the connection phase of a request should go through this: once an
/// engine has started streaming, repeating the request would duplicate text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl RetryPolicy {
    /// One attempt, no retries.
    #[must_use]
    pub const fn none() -> Self {
        Self { delays: Vec::new() }
    }

    /// `retries` extra attempts, doubling from `base` and capped at [`MAX_DELAY`].
    #[must_use]
    pub fn exponential(retries: usize, base: Duration) -> Self {
        let mut delay = base;
        let delays = (0..retries)
            .map(|_| {
                let current = delay.min(MAX_DELAY);
                delay = delay.saturating_mul(2);
                current
            })
            .collect();
        Self { delays }
    }

    /// Total number of attempts, the first one included.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.delays.len() + 1
    }

    #[must_use]
    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    /// Run `operation` until it succeeds or the schedule runs out.
    ///
    /// Returns the last error when every attempt failed.
    pub async fn run<F, Fut, T, E>(&self, what: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let total = self.attempts();
        for (i, delay) in self.delays.iter().enumerate() {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!(
                        "{what} failed (attempt {}/{total}): {e}. Retrying after {delay:?}...",
                        i + 1
                    );
                    sleep(*delay).await;
                }
            }
        }
        operation().await
    }
}

impl Default for RetryPolicy {
    /// Three retries starting at two seconds.
    fn default() -> Self {
        Self::exponential(3, Duration::from_secs(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quick(retries: usize) -> RetryPolicy {
        RetryPolicy::exponential(retries, Duration::from_millis(1))
    }

    #[test]
    fn exponential_schedule_doubles_and_caps() {
        let policy = RetryPolicy::exponential(5, Duration::from_secs(2));
        let secs: Vec<u64> = policy.delays().iter().map(Duration::as_secs).collect();
        assert_eq!(secs, vec![2, 4, 8, 10, 10]);
        assert_eq!(policy.attempts(), 6);
        assert_eq!(RetryPolicy::none().attempts(), 1);
    }

    #[tokio::test]
    async fn retry_succeeds_on_first_attempt() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let result = quick(2)
            .run("connect", || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), String>(())
                }
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_succeeds_after_failures() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let result: std::result::Result<(), String> = quick(3)
            .run("connect", || {
                let attempts = attempts.clone();
                async move {
                    let count = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    if count < 3 {
                        Err(String::from("fail"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_fails_after_all_attempts() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let result: std::result::Result<(), String> = quick(2)
            .run("connect", || {
                let attempts = attempts.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    Err(format!("fail {n}"))
                }
            })
            .await;
        assert_eq!(result.unwrap_err(), "fail 2");
        assert_eq!(attempts.load(Ordering::SeqCst), 3); // first try + 2 retries
    }
}
