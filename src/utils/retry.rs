//! Retry with exponential backoff for HTTP calls (openFDA, GCS)

use crate::utils::error::{EtlError, Result};
use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 第一次嘗試之後最多再重試幾次
    pub max_retries: u32,
    pub backoff_factor: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_factor: Duration::from_secs(2),
            max_backoff: Duration::from_secs(120),
        }
    }
}

/// Run `f` until it succeeds, fails with a non-retryable error, or the retry
/// budget is spent. The last error is returned unchanged on exhaustion.
pub async fn retry_with_backoff<F, Fut, T, R>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: R,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
    R: Fn(&EtlError) -> bool,
{
    let mut backoff = create_backoff(policy);
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;

        match f().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!(
                        operation = operation_name,
                        attempts = attempts,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    debug!(
                        operation = operation_name,
                        error = %err,
                        "Error is not retryable, failing immediately"
                    );
                    return Err(err);
                }

                if attempts > policy.max_retries {
                    warn!(
                        operation = operation_name,
                        attempts = attempts,
                        error = %err,
                        "Operation failed after maximum retries"
                    );
                    return Err(err);
                }

                match backoff.next_backoff() {
                    Some(duration) => {
                        warn!(
                            operation = operation_name,
                            attempts = attempts,
                            error = %err,
                            retry_in_ms = duration.as_millis() as u64,
                            "Operation failed, retrying"
                        );
                        tokio::time::sleep(duration).await;
                    }
                    None => return Err(err),
                }
            }
        }
    }
}

fn create_backoff(policy: &RetryPolicy) -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(policy.backoff_factor)
        .with_max_interval(policy.max_backoff)
        .with_multiplier(2.0)
        .with_randomization_factor(0.0)
        .with_max_elapsed_time(None) // 以 max_retries 控制次數
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_factor: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
        }
    }

    fn server_error() -> EtlError {
        EtlError::HttpStatusError {
            status: 503,
            url: "http://localhost/test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_retry_success_after_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result = retry_with_backoff(&fast_policy(3), "test", EtlError::is_retryable, move || {
            let calls = calls_clone.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(server_error())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted_returns_last_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result: Result<i32> =
            retry_with_backoff(&fast_policy(2), "test", EtlError::is_retryable, move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(server_error())
                }
            })
            .await;

        // 一次原始請求 + 兩次重試
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result,
            Err(EtlError::HttpStatusError { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_fast() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result: Result<i32> =
            retry_with_backoff(&fast_policy(5), "test", EtlError::is_retryable, move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(EtlError::HttpStatusError {
                        status: 404,
                        url: "http://localhost/missing".to_string(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
