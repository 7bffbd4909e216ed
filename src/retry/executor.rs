//! Retry loop: run an operation until it succeeds or the attempt budget runs out.

use anyhow::Result;
use log::{debug, info, warn};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

use super::error::Cancelled;
use super::policy::{OnRetry, RetryPolicy};
use super::sleep::{Sleeper, TokioSleeper};

/// Runs fallible async operations under a [`RetryPolicy`].
///
/// Holds no per-call state, so one executor can drive any number of
/// concurrent executions.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor<S: Sleeper = TokioSleeper> {
    sleeper: S,
}

impl RetryExecutor<TokioSleeper> {
    pub fn new() -> Self {
        Self {
            sleeper: TokioSleeper,
        }
    }
}

impl<S: Sleeper> RetryExecutor<S> {
    /// Creates an executor that waits on a custom [`Sleeper`].
    pub fn with_sleeper(sleeper: S) -> Self {
        Self { sleeper }
    }

    /// Runs `operation` until it succeeds or `policy.max_attempts` attempts
    /// have failed, in which case the last failure is returned unchanged.
    pub async fn execute<F, Fut, T, E>(&self, operation: F, policy: &RetryPolicy) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        self.execute_until(operation, policy, std::future::pending::<()>())
            .await
    }

    /// Like [`execute`](Self::execute), but gives up as soon as `cancel`
    /// completes.
    ///
    /// Cancellation drops the running attempt or pending delay and returns a
    /// [`Cancelled`] error.
    #[tracing::instrument(skip_all, fields(max_attempts = policy.attempts()))]
    pub async fn execute_until<F, Fut, T, E, C>(
        &self,
        mut operation: F,
        policy: &RetryPolicy,
        cancel: C,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<anyhow::Error>,
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);

        let max_attempts = policy.attempts();
        let mut attempt = 1u32;

        loop {
            let outcome = tokio::select! {
                biased;
                _ = &mut cancel => return Err(cancelled(attempt)),
                outcome = operation() => outcome,
            };

            let error: anyhow::Error = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("Succeeded on attempt {}/{}", attempt, max_attempts);
                    }
                    return Ok(value);
                }
                Err(e) => e.into(),
            };

            if attempt >= max_attempts {
                debug!(
                    "Attempt {}/{} failed ({}), giving up",
                    attempt, max_attempts, error
                );
                return Err(error);
            }

            if let Some(retry_if) = &policy.retry_if {
                if !retry_if(&error) {
                    debug!(
                        "Attempt {}/{} failed with a non-retryable error: {}",
                        attempt, max_attempts, error
                    );
                    return Err(error);
                }
            }

            if let Some(callback) = &policy.on_retry {
                notify(callback, &error, attempt);
            }

            let delay = policy.delay_for(attempt);
            info!(
                "Attempt {}/{} failed ({}), retrying in {}ms...",
                attempt,
                max_attempts,
                error,
                delay.as_millis()
            );

            tokio::select! {
                biased;
                _ = &mut cancel => return Err(cancelled(attempt)),
                _ = self.sleeper.sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}

/// Runs `operation` under `policy` on the tokio timer.
pub async fn retry<F, Fut, T, E>(operation: F, policy: &RetryPolicy) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Into<anyhow::Error>,
{
    RetryExecutor::new().execute(operation, policy).await
}

/// Runs `operation` under `policy` until it finishes or `cancel` completes.
pub async fn retry_until<F, Fut, T, E, C>(operation: F, policy: &RetryPolicy, cancel: C) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Into<anyhow::Error>,
    C: Future<Output = ()>,
{
    RetryExecutor::new()
        .execute_until(operation, policy, cancel)
        .await
}

fn cancelled(attempts: u32) -> anyhow::Error {
    debug!("Cancelled during attempt {}", attempts);
    anyhow::Error::from(Cancelled { attempts })
}

/// Invokes the retry callback. Its failures never reach the retry loop.
fn notify(callback: &OnRetry, error: &anyhow::Error, attempt: u32) {
    match panic::catch_unwind(AssertUnwindSafe(|| callback(error, attempt))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Retry callback failed on attempt {}: {:#}", attempt, e),
        Err(_) => warn!("Retry callback panicked on attempt {}", attempt),
    }
}
