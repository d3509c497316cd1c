use futures::future::BoxFuture;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::cli::config::RetrySettings;

/// Classification hook for the retry controller. Only transient errors are
/// retried; anything else aborts the attempt sequence on first occurrence.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Bounded retry with a fixed inter-attempt delay. No backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            delay: Duration::from_millis(settings.delay_ms),
        }
    }
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("all {attempts} attempts failed: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("not retryable: {0}")]
    Terminal(E),

    #[error("cancelled while waiting to retry")]
    Cancelled,
}

/// Runs `op` against `state` until it succeeds, the attempt budget is spent,
/// a terminal error occurs, or the token is cancelled during an inter-attempt
/// wait. `on_retry` is invoked before each wait so callers can report status
/// upward.
pub async fn run_with_retry<S, T, E, F>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    state: &mut S,
    mut op: F,
    mut on_retry: impl FnMut(u32, &E),
) -> Result<T, RetryError<E>>
where
    S: ?Sized,
    E: Transient + std::fmt::Display,
    F: for<'a> FnMut(&'a mut S) -> BoxFuture<'a, Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op(state).await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(RetryError::Terminal(e)),
            Err(e) => {
                if attempt >= policy.max_attempts {
                    return Err(RetryError::Exhausted { attempts: attempt, last: e });
                }
                on_retry(attempt, &e);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                    _ = tokio::time::sleep(policy.delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[derive(Debug)]
    struct FlakyError {
        transient: bool,
    }

    impl std::fmt::Display for FlakyError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky")
        }
    }

    impl Transient for FlakyError {
        fn is_transient(&self) -> bool {
            self.transient
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_op_is_attempted_exactly_max_times() {
        let policy = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        };
        let cancel = CancellationToken::new();
        let started = tokio::time::Instant::now();

        let mut attempts = 0u32;
        let result: Result<(), _> = run_with_retry(
            &policy,
            &cancel,
            &mut attempts,
            |count| {
                async move {
                    *count += 1;
                    Err(FlakyError { transient: true })
                }
                .boxed()
            },
            |_, _| {},
        )
        .await;

        assert_eq!(attempts, 3);
        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, .. })));
        // Two inter-attempt waits of 2s each
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_short_circuits() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();

        let mut attempts = 0u32;
        let result: Result<(), _> = run_with_retry(
            &policy,
            &cancel,
            &mut attempts,
            |count| {
                async move {
                    *count += 1;
                    Err(FlakyError { transient: false })
                }
                .boxed()
            },
            |_, _| {},
        )
        .await;

        assert_eq!(attempts, 1);
        assert!(matches!(result, Err(RetryError::Terminal(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failures() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let mut retries_reported = 0u32;

        let mut attempts = 0u32;
        let result = run_with_retry(
            &policy,
            &cancel,
            &mut attempts,
            |count| {
                async move {
                    *count += 1;
                    if *count < 3 {
                        Err(FlakyError { transient: true })
                    } else {
                        Ok(*count)
                    }
                }
                .boxed()
            },
            |_, _| retries_reported += 1,
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(retries_reported, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_retry_wait() {
        let policy = RetryPolicy {
            max_attempts: 5,
            delay: Duration::from_secs(60),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut attempts = 0u32;
        let result: Result<(), _> = run_with_retry(
            &policy,
            &cancel,
            &mut attempts,
            |count| {
                async move {
                    *count += 1;
                    Err(FlakyError { transient: true })
                }
                .boxed()
            },
            |_, _| {},
        )
        .await;

        assert_eq!(attempts, 1);
        assert!(matches!(result, Err(RetryError::Cancelled)));
    }
}
