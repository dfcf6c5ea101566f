// src/retry.rs
use std::future::Future;

use tracing::warn;

use crate::config::IoPolicy;
use crate::error::PaymasterError;

/// Runs a node query under `policy`: every attempt is bounded by the timeout and
/// only transient failures are retried. The last error is returned as is.
pub async fn with_retry<T, F, Fut>(policy: &IoPolicy, operation: &'static str, mut op: F) -> Result<T, PaymasterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PaymasterError>>,
{
    let mut attempt = 0u32;
    loop {
        let result = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(PaymasterError::Timeout {
                operation,
                millis: policy.timeout.as_millis(),
            }),
        };

        match result {
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                warn!(operation, attempt, error = %e, "transient node failure, retrying");
                tokio::time::sleep(policy.backoff * attempt).await;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_policy(max_retries: u32) -> IoPolicy {
        IoPolicy {
            timeout: Duration::from_millis(50),
            max_retries,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(&fast_policy(2), "flaky", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(PaymasterError::EthereumProviderError("connection reset".into()))
            } else {
                Ok(7u8)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(&fast_policy(1), "down", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PaymasterError::EthereumProviderError("503".into()))
        })
        .await;

        assert!(matches!(result, Err(PaymasterError::EthereumProviderError(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn logic_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(&fast_policy(3), "revert", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(PaymasterError::TokenQueryFailure {
                token: Default::default(),
                reason: "execution reverted".into(),
            })
        })
        .await;

        assert!(matches!(result, Err(PaymasterError::TokenQueryFailure { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_attempts_time_out() {
        let result: Result<(), _> = with_retry(&fast_policy(0), "slow", || async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(PaymasterError::Timeout { operation: "slow", .. })));
    }
}
