use std::fmt;

/// Returned when an execution is cancelled before it could finish.
///
/// Never produced by the wrapped operation, so it is never confused with a
/// failure worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled {
    /// Attempts started before cancellation, including an interrupted one.
    pub attempts: u32,
}

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cancelled after {} attempt(s)", self.attempts)
    }
}

impl std::error::Error for Cancelled {}
