//! Shared HTTP client: retry-with-backoff wrapper around `reqwest`.
//!
//! Every upstream call in this crate (quote source, history fallback,
//! reference-data scrape, derived queries, sentiment feeds) goes through
//! one of these helpers so that retry policy and user-agent/timeout
//! configuration live in a single place, the way `core::client` does for
//! the wire calls in a typical data-access crate.

mod retry;

pub use retry::{Backoff, RetryConfig};

use crate::core::error::ScreenError;
use reqwest::Client;
use std::time::Duration;
use url::Url;

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Thin wrapper around a configured [`reqwest::Client`] plus retry policy.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: Client,
    retry: RetryConfig,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::builder().build().expect("default client")
    }
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    pub fn retry_policy(&self) -> &RetryConfig {
        &self.retry
    }

    /// GET `url` as text, retrying per the configured [`RetryConfig`].
    ///
    /// A `402` (quota exhausted) response is returned as `Status` without
    /// being retried — callers on the primary-provider path use that to
    /// drive the fallback latch (see `providers::history_store`).
    pub async fn get_text(&self, url: Url) -> Result<String, ScreenError> {
        self.get_text_with(url, &self.retry).await
    }

    pub async fn get_text_with(
        &self,
        url: Url,
        retry: &RetryConfig,
    ) -> Result<String, ScreenError> {
        let max_attempts = if retry.enabled { retry.max_retries + 1 } else { 1 };
        let mut attempt = 0u32;
        loop {
            let outcome = self.http.get(url.clone()).send().await;
            match outcome {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp.text().await.map_err(ScreenError::from);
                    }
                    let code = status.as_u16();
                    if code == 402 {
                        return Err(ScreenError::Status {
                            status: code,
                            url: url.to_string(),
                        });
                    }
                    let retryable = retry.retry_on_status.contains(&code);
                    attempt += 1;
                    if !retryable || attempt >= max_attempts {
                        return Err(ScreenError::Status {
                            status: code,
                            url: url.to_string(),
                        });
                    }
                }
                Err(e) => {
                    let retryable = (e.is_timeout() && retry.retry_on_timeout)
                        || (e.is_connect() && retry.retry_on_connect);
                    attempt += 1;
                    if !retryable || attempt >= max_attempts {
                        return Err(ScreenError::Http(e));
                    }
                }
            }
            let delay = retry.backoff.delay_for(attempt);
            tokio::time::sleep(delay).await;
        }
    }

    /// GET `url` as raw bytes (used for MS-950-encoded registry pages).
    pub async fn get_bytes(&self, url: Url) -> Result<Vec<u8>, ScreenError> {
        let resp = self.http.get(url.clone()).send().await?;
        if !resp.status().is_success() {
            return Err(ScreenError::Status {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }

    /// GET `url` and decode the body as JSON.
    pub async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
    ) -> Result<T, ScreenError> {
        let body = self.get_text(url.clone()).await?;
        serde_json::from_str(&body)
            .map_err(|e| ScreenError::Data(format!("json parse error at {url}: {e}")))
    }

    /// POST `body` as JSON, no retry (used for the webhook notifier,
    /// where a retried duplicate notification is worse than a dropped one).
    pub async fn post_json(&self, url: Url, body: &serde_json::Value) -> Result<(), ScreenError> {
        let resp = self.http.post(url.clone()).json(body).send().await?;
        if !resp.status().is_success() {
            return Err(ScreenError::Status { status: resp.status().as_u16(), url: url.to_string() });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct HttpClientBuilder {
    user_agent: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    retry: Option<RetryConfig>,
}

impl HttpClientBuilder {
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    pub fn timeout(mut self, dur: Duration) -> Self {
        self.timeout = Some(dur);
        self
    }

    pub fn connect_timeout(mut self, dur: Duration) -> Self {
        self.connect_timeout = Some(dur);
        self
    }

    pub fn retry_policy(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn build(self) -> Result<HttpClient, ScreenError> {
        let mut builder = Client::builder()
            .user_agent(self.user_agent.as_deref().unwrap_or(USER_AGENT))
            .timeout(self.timeout.unwrap_or(Duration::from_secs(20)));
        if let Some(ct) = self.connect_timeout {
            builder = builder.connect_timeout(ct);
        }
        let http = builder.build()?;
        Ok(HttpClient {
            http,
            retry: self.retry.unwrap_or_default(),
        })
    }
}
