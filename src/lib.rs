pub mod command;
pub mod config;
pub mod http;
pub mod retry;
pub mod runtime;

pub use retry::{RetryExecutor, RetryPolicy, is_retryable, retry, retry_until};
