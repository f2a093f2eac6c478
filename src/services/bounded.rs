//! Bounded external calls.

use std::future::Future;
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult};

/// Run `fut`, failing with [`DomainError::Timeout`] once `limit` elapses.
pub async fn bounded<T, F>(limit: Duration, operation: &str, fut: F) -> DomainResult<T>
where
    F: Future<Output = DomainResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_ms = limit.as_millis() as u64, "operation timed out");
            Err(DomainError::Timeout {
                operation: operation.to_string(),
                after_ms: limit.as_millis() as u64,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_through_result() {
        let value = bounded(Duration::from_secs(1), "noop", async { Ok::<_, DomainError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out() {
        let err = bounded(Duration::from_millis(50), "fetch_unresolved", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, DomainError>(())
        })
        .await
        .unwrap_err();

        assert!(err.is_timeout());
        assert!(err.to_string().contains("fetch_unresolved"));
    }
}
