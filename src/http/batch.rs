//! Fetching many URLs with bounded concurrency

use super::{HttpClient, read_body};
use crate::config::Config;
use crate::error::{Error, Result};
use futures::StreamExt;
use futures::stream;
use serde::de::DeserializeOwned;
use std::pin::pin;
use tokio_util::sync::CancellationToken;

/// What to do when a response arrived but its body could not be read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BodyReadPolicy {
    /// Fail the whole batch with [`Error::BodyRead`] (default)
    #[default]
    Abort,
    /// Log a warning and leave that URL out of the results
    Skip,
}

/// Options for [`HttpClient::fetch_all`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Maximum number of requests in flight (minimum 1)
    pub concurrency: usize,
    /// Handling of body read failures
    pub on_body_error: BodyReadPolicy,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            concurrency: 10,
            on_body_error: BodyReadPolicy::Abort,
        }
    }
}

impl FetchOptions {
    /// Options using the configured concurrency hint
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.max_concurrency,
            ..Self::default()
        }
    }

    /// Set the body read policy
    pub fn on_body_error(mut self, policy: BodyReadPolicy) -> Self {
        self.on_body_error = policy;
        self
    }
}

/// A fetched URL with its fully read body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Requested URL
    pub url: String,
    /// HTTP status (always < 500; 5xx responses are retried, then dropped)
    pub status: u16,
    /// Response body
    pub body: Vec<u8>,
}

impl FetchedPage {
    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body decoded as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

enum Outcome {
    Page(FetchedPage),
    RequestFailed(Error),
    BodyFailed(Error),
}

impl HttpClient {
    /// GET every URL and read the bodies, returning pages in input order
    ///
    /// Up to `options.concurrency` requests run at once, each under the client's
    /// retry policy. A URL whose request fails is logged and skipped. A URL whose
    /// body cannot be read is handled per [`FetchOptions::on_body_error`].
    /// Cancellation fails the whole batch.
    pub async fn fetch_all<I, S>(
        &self,
        cancel: &CancellationToken,
        urls: I,
        options: &FetchOptions,
    ) -> Result<Vec<FetchedPage>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let urls: Vec<String> = urls.into_iter().map(Into::into).collect();
        let total = urls.len();

        let mut outcomes = pin!(
            stream::iter(urls)
                .map(|url| self.fetch_one(cancel, url))
                .buffered(options.concurrency.max(1))
        );

        let mut pages = Vec::with_capacity(total);
        while let Some(outcome) = outcomes.next().await {
            match outcome {
                Outcome::Page(page) => pages.push(page),
                Outcome::RequestFailed(e) if e.is_cancelled() => return Err(e),
                Outcome::RequestFailed(e) => {
                    self.logger.warn(&format!("Request failed: {}", e.report()));
                }
                Outcome::BodyFailed(e) if e.is_cancelled() => return Err(e),
                Outcome::BodyFailed(e) => match options.on_body_error {
                    BodyReadPolicy::Abort => return Err(e),
                    BodyReadPolicy::Skip => {
                        self.logger.warn(&format!("Skipping page: {}", e.report()));
                    }
                },
            }
        }

        tracing::debug!(requested = total, fetched = pages.len(), "Batch fetch finished");
        Ok(pages)
    }

    async fn fetch_one(&self, cancel: &CancellationToken, url: String) -> Outcome {
        let response = match self.get(cancel, &url).await {
            Ok(response) => response,
            Err(e) => return Outcome::RequestFailed(e),
        };
        let status = response.status().as_u16();
        match read_body(cancel, response).await {
            Ok(body) => Outcome::Page(FetchedPage { url, status, body }),
            Err(e) => Outcome::BodyFailed(e),
        }
    }
}
