// src/utils/retry.rs
use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::utils::error::{DartError, ErrorCategory};

/// Message fragments that indicate a dropped or stalled connection even when
/// the error itself carries a non-network category.
const TRANSIENT_MESSAGE_TOKENS: &[&str] = &[
    "connection",
    "timed out",
    "timeout",
    "temporarily",
    "remote end closed",
    "reset by peer",
    "broken pipe",
];

/// Returns true if the error is a recoverable network condition.
pub fn is_transient(error: &DartError) -> bool {
    is_transient_parts(error.category(), &error.detail())
}

/// Classifier over an already-extracted category and message.
pub fn is_transient_parts(category: ErrorCategory, message: &str) -> bool {
    if category.is_transient() {
        return true;
    }
    let lowered = message.to_lowercase();
    TRANSIENT_MESSAGE_TOKENS
        .iter()
        .any(|token| lowered.contains(token))
}

/// A remote call that gave up, either on a fatal error or after exhausting its attempts.
/// Renders as `<operation>_error:<category>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFailure {
    pub operation: &'static str,
    pub category: ErrorCategory,
    pub message: String,
    pub attempts: u32,
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_error:{}", self.operation, self.category)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    /// Linear backoff, saturating instead of overflowing.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_base.checked_mul(attempt).unwrap_or(Duration::MAX)
    }

    /// Runs `call` until it succeeds, fails with a non-transient error, or runs out of attempts.
    /// Sleeps `backoff_base * attempt` between attempts.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, CallFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DartError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt: u32 = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if is_transient(&err) && attempt < max_attempts {
                        let delay = self.delay_after(attempt);
                        tracing::warn!(
                            "{} failed on attempt {}/{} ({}), retrying in {:?}",
                            operation, attempt, max_attempts, err, delay
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    tracing::debug!("{} gave up after {} attempt(s): {}", operation, attempt, err.detail());
                    return Err(CallFailure {
                        operation,
                        category: err.category(),
                        message: err.to_string(),
                        attempts: attempt,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn timeout() -> DartError {
        DartError::Io(std::io::Error::from(ErrorKind::TimedOut))
    }

    #[test]
    fn timeout_is_transient() {
        assert!(is_transient(&timeout()));
        assert!(is_transient_parts(ErrorCategory::Timeout, ""));
    }

    #[test]
    fn format_errors_are_not_transient() {
        assert!(!is_transient(&DartError::Parse("expected value at line 1".into())));
        assert!(!is_transient(&DartError::InvalidIdentifier("12345A".into())));
        assert!(!is_transient_parts(ErrorCategory::ParseError, "invalid digit found in string"));
    }

    #[test]
    fn message_tokens_rescue_uncategorised_errors() {
        assert!(is_transient_parts(ErrorCategory::IoError, "Remote end closed connection without response"));
        assert!(is_transient_parts(ErrorCategory::ApiError, "service temporarily unavailable"));
        assert!(!is_transient_parts(ErrorCategory::ApiError, "no data"));
    }

    #[test]
    fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let result = tokio_test::block_on(policy.run("dart_list", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(timeout())
                } else {
                    Ok(n)
                }
            }
        }));
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn exhausted_attempts_report_tagged_reason() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let result: Result<(), _> = tokio_test::block_on(policy.run("sub_docs", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(timeout()) }
        }));
        let failure = result.unwrap_err();
        assert_eq!(failure.to_string(), "sub_docs_error:Timeout");
        assert_eq!(failure.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn fatal_error_short_circuits() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let result: Result<(), _> = tokio_test::block_on(policy.run("find_corp_code", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DartError::Parse("bad xml".into())) }
        }));
        assert_eq!(result.unwrap_err().to_string(), "find_corp_code_error:ParseError");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_grows_linearly_and_saturates() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1500));
        assert_eq!(policy.delay_after(1), Duration::from_millis(1500));
        assert_eq!(policy.delay_after(2), Duration::from_millis(3000));

        let huge = RetryPolicy::new(3, Duration::MAX / 2 + Duration::from_secs(1));
        assert_eq!(huge.delay_after(2), Duration::MAX);
    }
}
