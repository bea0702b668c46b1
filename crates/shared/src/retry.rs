//! Bounded retries with exponential backoff around blocking external calls.
//!
//! Every attempt runs on a blocking thread (`spawn_blocking`) bounded by a
//! per-attempt timeout, so a stuck external call can never stall the async
//! scheduler — a timed-out attempt is abandoned on its thread and the
//! executor moves on.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryExecutor {
    /// Total number of attempts (the first try included).
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub attempt_timeout: Duration,
}

/// Outcome of a retried operation. `elapsed` covers all attempts and the
/// backoff waits between them, success or not, and feeds the caller's
/// metrics.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Option<T>,
    pub succeeded: bool,
    pub attempts: u32,
    pub elapsed: Duration,
}

impl<T> RetryOutcome<T> {
    #[must_use]
    pub fn elapsed_ms(&self) -> u128 {
        self.elapsed.as_millis()
    }
}

impl RetryExecutor {
    #[must_use]
    pub fn new(max_retries: u32, base_backoff: Duration, attempt_timeout: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_backoff,
            attempt_timeout,
        }
    }

    /// Run `op` until it succeeds or the attempt budget is exhausted.
    /// Between attempt `i` and `i + 1` the executor waits
    /// `base_backoff * 2^i`; no wait follows the final attempt.
    pub async fn run<T, F>(&self, label: &str, op: F) -> RetryOutcome<T>
    where
        T: Send + 'static,
        F: Fn() -> anyhow::Result<T> + Send + Sync + Clone + 'static,
    {
        let started = Instant::now();

        for attempt in 0..self.max_retries {
            let op = op.clone();
            let handle = tokio::task::spawn_blocking(move || op());

            match tokio::time::timeout(self.attempt_timeout, handle).await {
                Ok(Ok(Ok(value))) => {
                    debug!(
                        label = %label,
                        attempt = attempt + 1,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "operation succeeded"
                    );
                    return RetryOutcome {
                        result: Some(value),
                        succeeded: true,
                        attempts: attempt + 1,
                        elapsed: started.elapsed(),
                    };
                }
                Ok(Ok(Err(e))) => {
                    warn!(
                        label = %label,
                        attempt = attempt + 1,
                        error = %e,
                        "attempt failed"
                    );
                }
                Ok(Err(join_err)) => {
                    warn!(
                        label = %label,
                        attempt = attempt + 1,
                        error = %join_err,
                        "attempt panicked"
                    );
                }
                Err(_) => {
                    // The blocking task keeps running on its thread, but from
                    // the scheduler's perspective the attempt is over.
                    warn!(
                        label = %label,
                        attempt = attempt + 1,
                        timeout_ms = self.attempt_timeout.as_millis() as u64,
                        "attempt timed out"
                    );
                }
            }

            if attempt + 1 < self.max_retries {
                let backoff = self.base_backoff * 2u32.saturating_pow(attempt);
                debug!(label = %label, backoff_ms = backoff.as_millis() as u64, "backing off");
                tokio::time::sleep(backoff).await;
            }
        }

        warn!(
            label = %label,
            attempts = self.max_retries,
            "all attempts exhausted"
        );
        RetryOutcome {
            result: None,
            succeeded: false,
            attempts: self.max_retries,
            elapsed: started.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Operation that fails its first `n - 1` calls, counting invocations.
    #[derive(Clone)]
    struct FlakyOp {
        calls: Arc<AtomicU32>,
        succeed_on: u32,
    }

    impl FlakyOp {
        fn new(succeed_on: u32) -> Self {
            Self {
                calls: Arc::new(AtomicU32::new(0)),
                succeed_on,
            }
        }

        fn call(&self) -> anyhow::Result<u32> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call < self.succeed_on {
                anyhow::bail!("transient failure #{call}")
            }
            Ok(call)
        }

        fn count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let executor = RetryExecutor::new(3, Duration::from_millis(10), Duration::from_secs(1));
        let op = FlakyOp::new(1);
        let probe = op.clone();
        let outcome = executor.run("test", move || op.call()).await;
        assert!(outcome.succeeded);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(probe.count(), 1);
    }

    #[tokio::test]
    async fn retries_until_success_with_cumulative_backoff() {
        let base = Duration::from_millis(20);
        let executor = RetryExecutor::new(4, base, Duration::from_secs(1));
        let op = FlakyOp::new(3);
        let probe = op.clone();
        let outcome = executor.run("test", move || op.call()).await;
        assert!(outcome.succeeded);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(probe.count(), 3);
        // Two failures waited base * (2^0 + 2^1) before the third attempt.
        assert!(outcome.elapsed >= base * 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_reports_failure() {
        let executor = RetryExecutor::new(3, Duration::from_millis(5), Duration::from_secs(1));
        let op = FlakyOp::new(10);
        let probe = op.clone();
        let outcome: RetryOutcome<u32> = executor.run("test", move || op.call()).await;
        assert!(!outcome.succeeded);
        assert!(outcome.result.is_none());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(probe.count(), 3);
    }

    #[tokio::test]
    async fn timed_out_attempts_count_against_the_budget() {
        let executor =
            RetryExecutor::new(2, Duration::from_millis(5), Duration::from_millis(30));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let op = move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(200));
            Ok(0u32)
        };
        let outcome = executor.run("slow", op).await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn elapsed_is_reported_on_failure_too() {
        let executor = RetryExecutor::new(2, Duration::from_millis(10), Duration::from_secs(1));
        let op = FlakyOp::new(10);
        let outcome: RetryOutcome<u32> = executor.run("test", move || op.call()).await;
        assert!(outcome.elapsed >= Duration::from_millis(10));
        assert!(outcome.elapsed_ms() >= 10);
    }

    #[tokio::test]
    async fn a_panicking_operation_is_contained() {
        let executor = RetryExecutor::new(2, Duration::from_millis(5), Duration::from_secs(1));
        let op = || -> anyhow::Result<u32> { panic!("boom") };
        let outcome = executor.run("panicky", op).await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.attempts, 2);
    }
}
