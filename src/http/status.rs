//! Classification of HTTP response statuses.

use reqwest::StatusCode;
use std::fmt;

/// A response came back with a non-success status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpStatusError {
    pub status: StatusCode,
    pub url: String,
}

impl fmt::Display for HttpStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {} from {}", self.status, self.url)
    }
}

impl std::error::Error for HttpStatusError {}

/// Returns true for statuses worth retrying: 429 and every 5xx.
///
/// Other client errors (401, 403, 404, ...) won't change on retry.
pub fn classify_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}
