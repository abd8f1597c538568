//! Constant-backoff retry policy for upstream calls.
//!
//! [`RetryPolicy::run`] re-invokes an async operation while it fails with a
//! retryable error, sleeping a fixed delay between attempts. Input and
//! configuration errors are returned immediately.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RagError, Result};

/// How many times to try an upstream operation and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 behave as 1.
    pub max_attempts: u32,
    /// Constant delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, delay: Duration::from_secs(1) }
    }
}

impl RetryPolicy {
    /// Create a policy.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// A policy that tries exactly once.
    pub fn none() -> Self {
        Self { max_attempts: 1, delay: Duration::ZERO }
    }

    /// Run `op` under this policy using [`RagError::is_retryable`].
    pub async fn run<T, F, Fut>(&self, operation: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_if(operation, RagError::is_retryable, op).await
    }

    /// Run `op`, retrying failures accepted by `retryable`.
    ///
    /// # Errors
    ///
    /// Non-retryable failures are returned unchanged. When every attempt
    /// fails, returns [`RagError::RetriesExhausted`] wrapping the last error.
    pub async fn run_if<T, F, Fut, P>(&self, operation: &str, retryable: P, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&RagError) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !retryable(&e) => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    return Err(RagError::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    warn!(operation, attempt, max_attempts, error = %e, "attempt failed, retrying");
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn upstream() -> RagError {
        RagError::GenerationError { backend: "stub".into(), message: "boom".into() }
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let started = tokio::time::Instant::now();

        let counter = calls.clone();
        let result: Result<()> = policy
            .run("generate", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(upstream()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(RagError::RetriesExhausted { attempts: 3, .. })));
        // Two sleeps between three attempts.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let value = RetryPolicy::new(5, Duration::from_millis(10))
            .run("embed", || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move { if n < 2 { Err(upstream()) } else { Ok(n) } }
            })
            .await
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn input_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = RetryPolicy::new(5, Duration::from_secs(60))
            .run("embed", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(RagError::InvalidInput("empty".into())) }
            })
            .await;
        assert!(matches!(result, Err(RagError::InvalidInput(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn custom_predicate_controls_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = RetryPolicy::new(4, Duration::ZERO)
            .run_if(
                "load",
                |_| true,
                || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(RagError::ConfigError("missing checkpoint".into())) }
                },
            )
            .await;
        assert!(matches!(result, Err(RagError::RetriesExhausted { attempts: 4, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
