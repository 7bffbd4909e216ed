//! HTTP fetching driven by the retry executor.

mod client;
mod status;

pub use client::HttpClient;
pub use status::{HttpStatusError, classify_status};
