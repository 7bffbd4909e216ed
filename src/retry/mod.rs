//! Retry with capped exponential backoff.
//!
//! # Structure
//!
//! - `policy` - Attempt budget, backoff parameters and optional hooks
//! - `executor` - The retry loop, with optional cancellation
//! - `classify` - Advisory predicate deciding whether a failure looks transient
//! - `sleep` - Non-blocking wait the executor suspends on between attempts
//! - `error` - Failure types surfaced by the executor itself

mod classify;
mod error;
mod executor;
mod policy;
mod sleep;

pub use classify::{TRANSIENT_ERROR_CODES, is_retryable, is_retryable_message};
pub use error::Cancelled;
pub use executor::{RetryExecutor, retry, retry_until};
pub use policy::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY,
    OnRetry, RetryIf, RetryPolicy,
};
pub use sleep::{Sleeper, TokioSleeper};

#[cfg(test)]
pub use sleep::MockSleeper;
