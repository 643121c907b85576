//! Bounded-attempt retry for pipeline stages.

use std::future::Future;
use std::time::Duration;

use slidecast_shared::{Result, SlidecastError};
use tokio_retry2::strategy::FixedInterval;
use tokio_retry2::{Retry, RetryError};
use tracing::warn;

/// How a retried stage ended when it did not hit a fatal error.
#[derive(Debug)]
pub enum Attempt<T> {
    Succeeded(T),
    /// Every allowed attempt failed with a retryable error; holds the last one.
    Exhausted(SlidecastError),
}

/// Runs an operation up to `max_attempts` times.
///
/// Retryable failures (see [`SlidecastError::is_retryable`]) are absorbed
/// until the budget runs out. Any other failure is returned as `Err`
/// immediately and never retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    /// A policy allowing `max_attempts` tries (at least one).
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Exactly one attempt.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `op`, labelling log lines with `label` (e.g. `batch_0003/json`).
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<Attempt<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts;
        let strategy = FixedInterval::new(self.backoff).take(max_attempts as usize - 1);
        let mut attempt = 0;

        let outcome = Retry::spawn(strategy, || {
            attempt += 1;
            let current = attempt;
            let fut = op();
            async move {
                match fut.await {
                    Ok(value) => Ok(value),
                    Err(e) if !e.is_retryable() => Err(RetryError::Permanent(e)),
                    Err(e) => {
                        if current < max_attempts {
                            warn!(
                                label,
                                attempt = current,
                                max_attempts,
                                error = %e,
                                "attempt failed, retrying"
                            );
                        }
                        Err(RetryError::Transient {
                            err: e,
                            retry_after: None,
                        })
                    }
                }
            }
        })
        .await;

        match outcome {
            Ok(value) => Ok(Attempt::Succeeded(value)),
            // Only transient errors survive to the end of the schedule.
            Err(e) if e.is_retryable() => {
                warn!(label, attempt = max_attempts, error = %e, "retry budget exhausted");
                Ok(Attempt::Exhausted(e))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_retryable_failure() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let outcome = RetryPolicy::new(2, Duration::ZERO)
            .run("test", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(SlidecastError::TransientService("blip".into()))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();

        assert!(matches!(outcome, Attempt::Succeeded(7)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let outcome: Attempt<()> = RetryPolicy::new(3, Duration::ZERO)
            .run("test", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(SlidecastError::schema("missing title"))
            })
            .await
            .unwrap();

        match outcome {
            Attempt::Exhausted(e) => assert!(e.to_string().contains("missing title")),
            Attempt::Succeeded(_) => panic!("expected exhaustion"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<Attempt<()>> = RetryPolicy::new(5, Duration::ZERO)
            .run("test", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(SlidecastError::Storage("disk full".into()))
            })
            .await;

        assert!(matches!(result, Err(SlidecastError::Storage(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fatal_error_after_transient_one_stops_the_schedule() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<Attempt<()>> = RetryPolicy::new(4, Duration::ZERO)
            .run("test", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(SlidecastError::TransientService("blip".into()))
                } else {
                    Err(SlidecastError::Storage("read-only".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(SlidecastError::Storage(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
        assert_eq!(RetryPolicy::once().max_attempts(), 1);
    }
}
