use anyhow::{Result, bail};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Number of attempts (including the first) when nothing else is configured.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delay before the first retry.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);

/// Factor applied to the delay after every failed attempt.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Upper bound on any single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Called with the failure and its 1-based attempt number before each retry.
///
/// An `Err` returned from the callback is logged and otherwise ignored.
pub type OnRetry = Arc<dyn Fn(&anyhow::Error, u32) -> Result<()> + Send + Sync>;

/// Decides whether a failure is worth another attempt.
pub type RetryIf = Arc<dyn Fn(&anyhow::Error) -> bool + Send + Sync>;

/// Exponential backoff policy with a cap.
///
/// The delay before attempt `n + 1` is
/// `min(initial_delay * backoff_multiplier^(n - 1), max_delay)`,
/// so the first retry waits exactly `initial_delay`.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first). Zero behaves like one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Growth factor of the delay, expected to be at least 1.
    pub backoff_multiplier: f64,
    /// Cap on a single delay.
    pub max_delay: Duration,
    /// Notified before every retry. Never invoked after the final attempt.
    pub on_retry: Option<OnRetry>,
    /// When set, failures it rejects are returned without further attempts.
    pub retry_if: Option<RetryIf>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_delay: DEFAULT_MAX_DELAY,
            on_retry: None,
            retry_if: None,
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("max_delay", &self.max_delay)
            .field("on_retry", &self.on_retry.as_ref().map(|_| "<callback>"))
            .field("retry_if", &self.retry_if.as_ref().map(|_| "<predicate>"))
            .finish()
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Registers a callback invoked before each retry.
    pub fn on_retry<F>(mut self, callback: F) -> Self
    where
        F: Fn(&anyhow::Error, u32) -> Result<()> + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(callback));
        self
    }

    /// Only retry failures accepted by `predicate`.
    ///
    /// Pass [`crate::retry::is_retryable`] to stop early on failures that
    /// don't look transient.
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&anyhow::Error) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Some(Arc::new(predicate));
        self
    }

    /// The attempt budget, never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after the failed attempt `attempt` (1-based).
    ///
    /// Saturates to `max_delay` instead of overflowing.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let nanos =
            (self.initial_delay.as_nanos() as f64 * self.backoff_multiplier.powi(exponent)).round();

        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(nanos as u64)
    }

    /// Rejects parameter combinations that make no sense.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            bail!("max attempts must be at least 1");
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            bail!(
                "backoff multiplier must be a finite number >= 1 (got {})",
                self.backoff_multiplier
            );
        }
        if self.max_delay < self.initial_delay {
            bail!(
                "max delay ({}ms) must not be shorter than the initial delay ({}ms)",
                self.max_delay.as_millis(),
                self.initial_delay.as_millis()
            );
        }
        Ok(())
    }
}
