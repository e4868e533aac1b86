//! Deadline guard for async operations
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct DeadlineConfig {
    /// Hard limit for a single outbound call.
    pub deadline: Duration,
    /// Calls at or above this duration emit a slow-call diagnostic.
    pub slow_threshold: Duration,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_millis(4_000),
            slow_threshold: Duration::from_millis(1_200),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{label} timed out after {deadline:?}")]
pub struct DeadlineExceeded {
    pub label: &'static str,
    pub deadline: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum GuardError<E: std::fmt::Debug + std::fmt::Display> {
    #[error("{label} timed out after {deadline:?}")]
    DeadlineExceeded {
        label: &'static str,
        deadline: Duration,
    },
    #[error("{0}")]
    Inner(E),
}

impl<E: std::fmt::Debug + std::fmt::Display> GuardError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, GuardError::DeadlineExceeded { .. })
    }
}

/// Race a future against the configured deadline.
///
/// The slow-call diagnostic fires whether the call ultimately succeeded or
/// timed out. A timed-out future is dropped, not cancelled remotely: work
/// already in flight on the other side of the call may still complete.
pub async fn with_deadline<F, T>(
    config: &DeadlineConfig,
    correlation_id: &str,
    label: &'static str,
    future: F,
) -> Result<T, DeadlineExceeded>
where
    F: Future<Output = T>,
{
    let started = Instant::now();
    let outcome = timeout(config.deadline, future).await;
    let elapsed = started.elapsed();

    if elapsed >= config.slow_threshold {
        warn!(
            %correlation_id,
            label,
            elapsed_ms = elapsed.as_millis() as u64,
            timed_out = outcome.is_err(),
            "slow outbound call"
        );
    }

    outcome.map_err(|_| DeadlineExceeded {
        label,
        deadline: config.deadline,
    })
}

/// Race a fallible future against the configured deadline.
///
/// Keeps the inner error type so callers can map timeouts and operation
/// failures to different conditions.
pub async fn guard<F, T, E>(
    config: &DeadlineConfig,
    correlation_id: &str,
    label: &'static str,
    future: F,
) -> Result<T, GuardError<E>>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Debug + std::fmt::Display,
{
    match with_deadline(config, correlation_id, label, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(GuardError::Inner(e)),
        Err(DeadlineExceeded { label, deadline }) => {
            Err(GuardError::DeadlineExceeded { label, deadline })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_config() -> DeadlineConfig {
        DeadlineConfig {
            deadline: Duration::from_millis(50),
            slow_threshold: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn test_with_deadline_success() {
        let result = with_deadline(&short_config(), "test", "quick call", async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_deadline_elapsed() {
        let result = with_deadline(&short_config(), "test", "stalled call", async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            42
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.label, "stalled call");
        assert_eq!(err.deadline, Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_with_deadline_returns_within_deadline() {
        let started = Instant::now();
        let _ = with_deadline(&short_config(), "test", "stalled call", async {
            tokio::time::sleep(Duration::from_secs(30)).await;
        })
        .await;

        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_guard_success() {
        let result = guard(&short_config(), "test", "quick call", async {
            Ok::<_, String>(42)
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_guard_inner_failure() {
        let result = guard(&short_config(), "test", "failing call", async {
            Err::<i32, _>("connection reset".to_string())
        })
        .await;

        let err = result.unwrap_err();
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "connection reset");
    }

    #[tokio::test]
    async fn test_guard_deadline_exceeded() {
        let result = guard(&short_config(), "test", "stalled call", async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, String>(42)
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("stalled call"));
    }

    #[tokio::test]
    async fn test_slow_call_still_succeeds() {
        let result = with_deadline(&short_config(), "test", "slow call", async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            7
        })
        .await;

        assert_eq!(result.unwrap(), 7);
    }
}
