//! Classification of failures as transient or permanent.
//!
//! Purely advisory: the executor only consults it when a policy opts in via
//! [`RetryPolicy::retry_if`](super::RetryPolicy::retry_if).

use std::error::Error as StdError;
use std::io;

use super::error::Cancelled;
use crate::http::{HttpStatusError, classify_status};

/// Error codes of transient network failures, matched case-insensitively
/// against failure messages.
pub const TRANSIENT_ERROR_CODES: &[&str] = &[
    "ECONNRESET",
    "ETIMEDOUT",
    "ENOTFOUND",
    "ECONNREFUSED",
    "ECONNABORTED",
    "EHOSTUNREACH",
    "EAI_AGAIN",
    "EPIPE",
];

/// Phrases that mark a failure message as transient.
const TRANSIENT_PHRASES: &[&str] = &["rate limit", "timeout", "network"];

/// Checks whether a failure looks transient.
///
/// Every error in the cause chain is considered, so context added with
/// [`anyhow::Context`] does not hide a timeout underneath. A typed cause with
/// a definite verdict, such as an HTTP status, decides on its own; messages
/// are only scanned when no cause has one.
pub fn is_retryable(error: &anyhow::Error) -> bool {
    if error.downcast_ref::<Cancelled>().is_some() {
        return false;
    }

    if let Some(verdict) = error.chain().find_map(|cause| typed_verdict(cause)) {
        return verdict;
    }

    error
        .chain()
        .any(|cause| is_retryable_message(Some(&cause.to_string())))
}

/// Message half of [`is_retryable`]: matches the transient error codes and
/// phrases against bare text.
///
/// This is not a classifier for failures. Any text mentioning a timeout
/// matches, so pass failures to [`is_retryable`] instead. `None` stands for a
/// failure without a message and is never retryable.
pub fn is_retryable_message(message: Option<&str>) -> bool {
    let Some(message) = message else {
        return false;
    };
    let lowered = message.to_lowercase();

    TRANSIENT_ERROR_CODES
        .iter()
        .any(|code| lowered.contains(&code.to_lowercase()))
        || TRANSIENT_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

/// Verdict for typed errors, `None` when the type alone doesn't tell.
///
/// Status and reqwest errors carry the URL in their message, so their verdict
/// must not be second-guessed by scanning that text.
fn typed_verdict(cause: &(dyn StdError + 'static)) -> Option<bool> {
    if let Some(e) = cause.downcast_ref::<HttpStatusError>() {
        return Some(classify_status(e.status));
    }

    if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
        if e.is_timeout() || e.is_connect() {
            return Some(true);
        }
        if let Some(status) = e.status() {
            return Some(classify_status(status));
        }
        if e.is_builder() || e.is_decode() || e.is_redirect() {
            return Some(false);
        }
        return None;
    }

    if let Some(e) = cause.downcast_ref::<io::Error>() {
        let transient = matches!(
            e.kind(),
            io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::ConnectionRefused
                | io::ErrorKind::NotConnected
                | io::ErrorKind::TimedOut
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::Interrupted
                | io::ErrorKind::WouldBlock
        );
        return transient.then_some(true);
    }

    None
}
