//! Retry logic with exponential backoff for remote store operations.

use crate::error::{PanforgeError, Result};
use crate::store::BlobStore;
use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (first try included)
    pub max_attempts: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier (typically 2.0)
    pub multiplier: f32,
    /// Add jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Calculate backoff duration for attempt number
    fn calculate_backoff(&self, attempt: u32) -> Duration {
        let mut backoff = self.initial_backoff.as_millis() as f32;
        for _ in 0..attempt {
            backoff *= self.multiplier;
        }

        let mut duration =
            Duration::from_millis(backoff.min(self.max_backoff.as_millis() as f32) as u64);

        if self.jitter {
            let mut rng = rand::thread_rng();
            let jitter_ms = rng.gen_range(0..=(duration.as_millis() / 4) as u64);
            duration += Duration::from_millis(jitter_ms);
        }

        duration
    }

    /// Run an async operation under this policy. Only transient errors are
    /// retried; anything else propagates immediately.
    pub async fn run<T, F, Fut>(&self, context: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!("{context} succeeded after {attempt} retries");
                    }
                    return Ok(result);
                }
                Err(err) => {
                    if !err.is_transient() {
                        error!("non-retryable error in {context}: {err}");
                        return Err(err);
                    }

                    if attempt < self.max_attempts - 1 {
                        let backoff = self.calculate_backoff(attempt);
                        warn!(
                            "attempt {}/{} failed for {context}: {err}. Retrying in {backoff:?}",
                            attempt + 1,
                            self.max_attempts,
                        );
                        tokio::time::sleep(backoff).await;
                    } else {
                        error!(
                            "all {} attempts failed for {context}: {err}",
                            self.max_attempts,
                        );
                    }

                    last_error = Some(err);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| PanforgeError::Store(format!("retry budget exhausted: {context}"))))
    }
}

/// Decorator applying a [`RetryPolicy`] to every store operation.
pub struct RetryingStore {
    inner: Arc<dyn BlobStore>,
    policy: RetryPolicy,
}

impl RetryingStore {
    pub fn new(inner: Arc<dyn BlobStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl BlobStore for RetryingStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        self.policy
            .run(&format!("exists {key}"), || self.inner.exists(key))
            .await
    }

    async fn get(&self, key: &str, dest: &Path) -> Result<()> {
        self.policy
            .run(&format!("get {key}"), || self.inner.get(key, dest))
            .await
    }

    async fn put(&self, src: &Path, key: &str) -> Result<()> {
        self.policy
            .run(&format!("put {key}"), || self.inner.put(src, key))
            .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.policy
            .run(&format!("list {prefix}"), || self.inner.list(prefix))
            .await
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<()> {
        self.policy
            .run(&format!("remove {prefix}"), || {
                self.inner.remove_prefix(prefix)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let counter = AtomicU32::new(0);

        let result = fast_policy()
            .run("flaky operation", || {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count < 2 {
                        Err(PanforgeError::Store("connection reset".to_string()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts() {
        let counter = AtomicU32::new(0);

        let result = fast_policy()
            .run("always failing", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, _>(PanforgeError::Store("timeout".to_string())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_integrity_errors_are_not_retried() {
        let counter = AtomicU32::new(0);

        let result = fast_policy()
            .run("corrupt input", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, _>(PanforgeError::Integrity("collision".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(PanforgeError::Integrity(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_calculation() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: false,
        };

        assert_eq!(policy.calculate_backoff(0), Duration::from_millis(100));
        assert_eq!(policy.calculate_backoff(1), Duration::from_millis(200));
        assert_eq!(policy.calculate_backoff(2), Duration::from_millis(400));
        assert_eq!(policy.calculate_backoff(4), Duration::from_secs(1));
    }
}
