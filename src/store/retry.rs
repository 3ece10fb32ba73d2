use std::future::Future;
use std::time::Duration;

use super::StoreError;

/// Bounds on storage calls: each attempt gets `timeout`; a timed-out
/// attempt is retried once after `retry_delay`.
#[derive(Debug, Clone, Copy)]
pub struct StoragePolicy {
    pub timeout: Duration,
    pub retry_delay: Duration,
}

impl Default for StoragePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retry_delay: Duration::from_millis(100),
        }
    }
}

impl StoragePolicy {
    /// Run `attempt` under the timeout. Only timeouts are retried, and only
    /// once; every other outcome is returned as is.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut retried = false;
        loop {
            let outcome = match tokio::time::timeout(self.timeout, attempt()).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(format!(
                    "{} exceeded {}ms",
                    operation,
                    self.timeout.as_millis()
                ))),
            };

            match outcome {
                Err(StoreError::Timeout(reason)) if !retried => {
                    tracing::warn!("Storage {} timed out ({}), retrying once", operation, reason);
                    retried = true;
                    tokio::time::sleep(self.retry_delay).await;
                }
                other => return other,
            }
        }
    }

    /// `run` for revision-checked writes. When the first attempt timed out,
    /// a `Conflict` or `NotFound` from the retry may be that attempt's own
    /// commit showing through, so the outcome is reported as unknown.
    pub async fn run_checked_write<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempts = 0u32;
        let result = self
            .run(operation, || {
                attempts += 1;
                attempt()
            })
            .await;

        match result {
            Err(StoreError::Conflict { .. } | StoreError::NotFound { .. }) if attempts > 1 => {
                tracing::warn!("Storage {} retry could not confirm the first attempt", operation);
                Err(StoreError::Timeout(format!(
                    "{} timed out and its outcome is unknown",
                    operation
                )))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn policy() -> StoragePolicy {
        StoragePolicy {
            timeout: Duration::from_millis(50),
            retry_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_a_timeout_once_then_succeeds() {
        let calls = AtomicUsize::new(0);
        let result = policy()
            .run("get", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                    Ok::<_, StoreError>(n)
                }
            })
            .await;
        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn surfaces_timeout_after_second_failure() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), StoreError> = policy()
            .run("update", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StoreError::Timeout("pool".to_string())) }
            })
            .await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn checked_write_reports_unknown_outcome_after_retry() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), StoreError> = policy()
            .run_checked_write("update", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        // commits, then the reply stalls past the timeout
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        Ok(())
                    } else {
                        Err(StoreError::Conflict { expected: 1, actual: 2 })
                    }
                }
            })
            .await;
        assert!(matches!(result, Err(StoreError::Timeout(_))), "got {:?}", result);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn checked_write_keeps_first_attempt_conflicts() {
        let result: Result<(), StoreError> = policy()
            .run_checked_write("delete", || async { Err(StoreError::Conflict { expected: 1, actual: 3 }) })
            .await;
        assert_eq!(result, Err(StoreError::Conflict { expected: 1, actual: 3 }));
    }

    #[tokio::test]
    async fn does_not_retry_other_errors() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), StoreError> = policy()
            .run("update", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StoreError::Conflict { expected: 1, actual: 2 }) }
            })
            .await;
        assert_eq!(result, Err(StoreError::Conflict { expected: 1, actual: 2 }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
