//! Retry policies for calls to remote collaborators.
//!
//! Provides configurable retry with either a fixed delay or exponential
//! backoff. Only errors the caller marks as transient are retried; a
//! rejected request is a rejected request no matter how often it is sent.

use std::future::Future;
use std::time::Duration;

/// Retry policy for one remote call.
#[derive(Debug, Clone)]
pub enum RetryPolicy {
    /// No retry, fail on the first error.
    None,
    /// Constant delay between attempts.
    Fixed {
        /// Number of attempts (including the initial attempt).
        attempts: u32,
        /// Delay between attempts.
        delay: Duration,
    },
    /// Exponentially increasing delay between attempts.
    Exponential {
        /// Number of attempts (including the initial attempt).
        attempts: u32,
        /// Delay before the first retry.
        initial_delay: Duration,
        /// Multiplier applied to the delay after each retry.
        multiplier: f64,
    },
}

impl RetryPolicy {
    /// Exponential backoff doubling from `initial_delay`.
    #[must_use]
    pub const fn exponential(attempts: u32, initial_delay: Duration) -> Self {
        Self::Exponential {
            attempts,
            initial_delay,
            multiplier: 2.0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Fixed {
            attempts: 3,
            delay: Duration::from_millis(100),
        }
    }
}

/// Runs `operation` under `policy`, retrying errors `is_transient` accepts.
///
/// The last attempt's result is returned as-is; a non-transient error
/// short-circuits without sleeping.
///
/// # Errors
///
/// Returns the first non-transient error, or the final error once the
/// attempts are exhausted.
pub async fn retry_with_policy<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    is_transient: P,
    operation: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let (attempts, mut delay, multiplier) = match policy {
        RetryPolicy::None => (1, Duration::ZERO, 1.0),
        RetryPolicy::Fixed { attempts, delay } => (*attempts, *delay, 1.0),
        RetryPolicy::Exponential {
            attempts,
            initial_delay,
            multiplier,
        } => (*attempts, *initial_delay, *multiplier),
    };

    for attempt in 1..attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if is_transient(&error) => {
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = delay.mul_f64(multiplier);
            }
            Err(error) => return Err(error),
        }
    }
    operation().await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn counter() -> Arc<AtomicU32> {
        Arc::new(AtomicU32::new(0))
    }

    #[tokio::test]
    async fn first_success_ends_the_attempts() {
        let calls = counter();
        let result: Result<&str, String> = retry_with_policy(
            &RetryPolicy::Fixed {
                attempts: 3,
                delay: Duration::from_millis(1),
            },
            |_| true,
            || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("done")
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_exhaustion() {
        let calls = counter();
        let result: Result<&str, String> = retry_with_policy(
            &RetryPolicy::Fixed {
                attempts: 3,
                delay: Duration::from_millis(1),
            },
            |_| true,
            || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("still down".to_string())
                }
            },
        )
        .await;

        assert_eq!(result.unwrap_err(), "still down");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_short_circuit() {
        let calls = counter();
        let result: Result<&str, String> = retry_with_policy(
            &RetryPolicy::Fixed {
                attempts: 5,
                delay: Duration::from_millis(1),
            },
            |error: &String| error.contains("transient"),
            || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("bad request".to_string())
                }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_later_attempt_may_succeed() {
        let calls = counter();
        let result: Result<u32, String> = retry_with_policy(
            &RetryPolicy::exponential(3, Duration::from_millis(1)),
            |_| true,
            || {
                let calls = calls.clone();
                async move {
                    let attempt = calls.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 {
                        Err("not yet".to_string())
                    } else {
                        Ok(attempt)
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn the_none_policy_tries_exactly_once() {
        let calls = counter();
        let result: Result<&str, String> = retry_with_policy(&RetryPolicy::None, |_| true, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("down".to_string())
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
