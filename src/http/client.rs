//! HTTP client whose requests run under a retry policy.

use anyhow::{Context, Result};
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::future::Future;

use super::status::HttpStatusError;
use crate::retry::{RetryExecutor, RetryPolicy};

/// HTTP client that repeats failed requests according to a [`RetryPolicy`].
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    executor: RetryExecutor,
}

impl HttpClient {
    /// Creates a new HTTP client wrapping the given reqwest Client.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            executor: RetryExecutor::new(),
        }
    }

    /// Creates a client with the default user agent.
    pub fn with_defaults() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("retrier/", env!("RETRIER_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::new(client))
    }

    /// Returns a reference to the underlying reqwest Client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Performs a GET request and returns the response body as text.
    pub async fn get_text(&self, url: &str, policy: &RetryPolicy) -> Result<String> {
        self.get_text_until(url, policy, std::future::pending())
            .await
    }

    /// Like [`get_text`](Self::get_text), but abandons the request as soon as
    /// `cancel` completes.
    #[tracing::instrument(skip(self, policy, cancel))]
    pub async fn get_text_until<C>(&self, url: &str, policy: &RetryPolicy, cancel: C) -> Result<String>
    where
        C: Future<Output = ()>,
    {
        debug!("GET {}...", url);

        self.executor
            .execute_until(
                move || async move {
                    let response = self.get_once(url).await?;
                    response
                        .text()
                        .await
                        .context("Failed to read response body")
                },
                policy,
                cancel,
            )
            .await
    }

    /// Performs a GET request and deserializes the JSON response.
    #[tracing::instrument(skip(self, policy))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, policy: &RetryPolicy) -> Result<T> {
        debug!("GET JSON from {}...", url);

        self.executor
            .execute(
                move || async move {
                    let response = self.get_once(url).await?;
                    response
                        .json::<T>()
                        .await
                        .context("Failed to parse JSON response")
                },
                policy,
            )
            .await
    }

    /// Single request without retry. Non-2xx statuses become [`HttpStatusError`].
    async fn get_once(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if !status.is_success() {
            return Err(HttpStatusError {
                status,
                url: url.to_string(),
            }
            .into());
        }
        Ok(response)
    }
}
