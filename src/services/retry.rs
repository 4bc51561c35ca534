use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::services::clock::Sleeper;

/// Failure of a single provider call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Network trouble, throttling or a provider-side 5xx. Worth retrying.
    #[error("transient delivery error: {0}")]
    Transient(String),

    /// The provider rejected the request itself; retrying cannot help.
    #[error("permanent delivery error: {0}")]
    Permanent(String),

    #[error("delivery cancelled")]
    Cancelled,
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            DeliveryError::Transient(m) | DeliveryError::Permanent(m) => m,
            DeliveryError::Cancelled => "cancelled",
        }
    }
}

/// Heuristics for provider error text that indicates a transient condition.
pub fn is_retryable_message(msg: &str) -> bool {
    let e = msg.to_lowercase();
    e.contains("too many requests")
        || e.contains("throttl")
        || e.contains("timeout")
        || e.contains("timed out")
        || e.contains("temporarily unavailable")
        || e.contains("service unavailable")
        || e.contains("bad gateway")
        || e.contains("connection reset")
        || e.contains("connection refused")
}

/// Classify an HTTP status from a provider: 429 and 5xx are transient.
pub fn classify_status(status: u16, detail: String) -> DeliveryError {
    if status == 429 || status >= 500 {
        DeliveryError::Transient(detail)
    } else {
        DeliveryError::Permanent(detail)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: DeliveryError },

    #[error("{0}")]
    Permanent(DeliveryError),

    #[error("cancelled")]
    Cancelled,
}

impl RetryError {
    /// The provider error that ended the call, if any.
    pub fn delivery_error(&self) -> Option<&DeliveryError> {
        match self {
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::Permanent(e) => Some(e),
            RetryError::Cancelled => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): initial * 2^retry.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
    }
}

/// Wraps provider calls with bounded exponential backoff.
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { policy, sleeper }
    }

    /// Call `op` up to `max_retries + 1` times. Permanent errors stop at once;
    /// cancellation is observed during both the call and the backoff sleep.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DeliveryError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                r = op() => r,
            };

            let err = match result {
                Ok(v) => return Ok(v),
                Err(DeliveryError::Cancelled) => return Err(RetryError::Cancelled),
                Err(e) if !e.is_retryable() => return Err(RetryError::Permanent(e)),
                Err(e) => e,
            };

            if attempt >= self.policy.max_retries {
                return Err(RetryError::Exhausted {
                    attempts: attempt + 1,
                    last: err,
                });
            }

            let delay = self.policy.backoff(attempt);
            tracing::debug!(
                "Attempt {} failed ({}), retrying in {:?}",
                attempt + 1,
                err,
                delay
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = self.sleeper.sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::TokioSleeper;
    use crate::services::testing::RecordingSleeper;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn executor(sleeper: Arc<RecordingSleeper>) -> RetryExecutor {
        RetryExecutor::new(RetryPolicy::default(), sleeper)
    }

    #[tokio::test]
    async fn transient_failures_back_off_exponentially_then_give_up() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = executor(sleeper.clone())
            .run(&CancellationToken::new(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DeliveryError::Transient("503 service unavailable".to_string()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            sleeper.delays(),
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000)
            ]
        );
        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert_eq!(last.message(), "503 service unavailable");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = executor(sleeper.clone())
            .run(&CancellationToken::new(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DeliveryError::Permanent("InvalidPlatformToken".to_string()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays().is_empty());
        assert!(matches!(result, Err(RetryError::Permanent(_))));
    }

    #[tokio::test]
    async fn recovers_after_transient_failure() {
        let sleeper = Arc::new(RecordingSleeper::default());
        let calls = AtomicU32::new(0);

        let result = executor(sleeper.clone())
            .run(&CancellationToken::new(), || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(DeliveryError::Transient("timeout".to_string()))
                } else {
                    Ok("msg-1")
                }
            })
            .await;

        tokio_test::assert_ok!(&result);
        assert_eq!(result.unwrap(), "msg-1");
        assert_eq!(sleeper.delays(), vec![Duration::from_millis(1000)]);
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_calling() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = executor(Arc::new(RecordingSleeper::default()))
            .run(&cancel, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_interrupts_backoff_sleep() {
        let cancel = CancellationToken::new();
        let executor = RetryExecutor::new(RetryPolicy::default(), Arc::new(TokioSleeper));
        let calls = AtomicU32::new(0);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result: Result<(), _> = executor
            .run(&cancel, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DeliveryError::Transient("bad gateway".to_string()))
            })
            .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn status_classification() {
        assert!(classify_status(429, "slow down".into()).is_retryable());
        assert!(classify_status(502, "bad gateway".into()).is_retryable());
        assert!(!classify_status(400, "InvalidPlatformToken".into()).is_retryable());
        assert!(is_retryable_message("Connection reset by peer"));
        assert!(!is_retryable_message("EndpointDisabled"));
    }
}
