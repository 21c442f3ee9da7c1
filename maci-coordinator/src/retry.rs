//! Retry with exponential backoff for ledger calls.

use std::{future::Future, time::Duration};

use tracing::warn;

use crate::error::LedgerError;

/// Decides from an error message whether a failure is worth retrying.
pub type Classifier = fn(&str) -> bool;

const TRANSIENT_SIGNATURES: &[&str] = &[
    "connection reset",
    "connection closed",
    "connection refused",
    "timed out",
    "timeout",
    "dns error",
    "failed to lookup address",
    "rate limit",
    "too many requests",
    "429",
    "502",
    "503",
    "bad gateway",
    "service unavailable",
];

pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    TRANSIENT_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub classifier: Classifier,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            classifier: is_transient_message,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// `base_delay * 2^(attempt-1)`, capped at `max_delay`. Attempts are
    /// 1-based.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn is_retryable(&self, err: &LedgerError) -> bool {
        err.transient_text().is_some_and(self.classifier)
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or
    /// `max_attempts` is used up.
    pub async fn run<T, F, Fut>(&self, call: &'static str, mut op: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts && self.is_retryable(&err) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        call,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient ledger error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            classifier: is_transient_message,
        }
    }

    #[test]
    fn classifies_transient_messages() {
        assert!(is_transient_message("Connection reset by peer"));
        assert!(is_transient_message("request timed out"));
        assert!(is_transient_message("HTTP error 429 Too Many Requests"));
        assert!(is_transient_message("503 Service Unavailable"));
        assert!(is_transient_message("error trying to connect: dns error"));
        assert!(!is_transient_message("execution reverted: ProcessingComplete()"));
        assert!(!is_transient_message("insufficient funds for gas"));
    }

    #[test]
    fn reverts_are_never_retryable() {
        let policy = RetryPolicy::default();
        let revert = LedgerError::Reverted {
            call: "processMessages",
            message: "timeout in revert text".into(),
        };
        assert!(!policy.is_retryable(&revert));
        let rpc = LedgerError::from_transport("nextPollId", "connection refused");
        assert!(policy.is_retryable(&rpc));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(4), Duration::from_secs(3));
        assert_eq!(policy.delay_for(40), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let attempts = AtomicU32::new(0);
        let value = fast(5)
            .run("numSignUps", || async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(LedgerError::from_transport("numSignUps", "connection reset"))
                } else {
                    Ok(7u64)
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let err = fast(3)
            .run("numSignUps", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(LedgerError::from_transport("numSignUps", "request timed out"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Timeout { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_propagate_immediately() {
        let attempts = AtomicU32::new(0);
        let err = fast(5)
            .run("publishResults", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(LedgerError::from_transport("publishResults", "nonce too low"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Rpc { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
