//! HTTP client with default headers and automatic retry
//!
//! Every request runs under the retry engine with the client's [`RetryPolicy`].
//! Transport failures and 5xx responses are retried; any other status is handed
//! back to the caller untouched, who must inspect it.

mod batch;

pub use batch::{BodyReadPolicy, FetchOptions, FetchedPage};

use crate::config::{Config, RetryPolicy};
use crate::error::{Error, Result};
use crate::logging::{Logger, default_logger};
use crate::retry::{CancelPoint, retry_transient};
use crate::stats::ExecutionStats;
use reqwest::{Method, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// HTTP client for spider code
///
/// Cloning is cheap: clones share the underlying connection pool but get their
/// own copy of the default headers, so `set_header` on a clone never affects
/// the original.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    headers: HashMap<String, String>,
    policy: RetryPolicy,
    timeout: Duration,
    stats: Option<Arc<ExecutionStats>>,
    logger: Arc<dyn Logger>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("headers", &self.headers)
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Create a client with the given timeout and no retries
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            headers: HashMap::new(),
            policy: RetryPolicy::none(),
            timeout,
            stats: None,
            logger: default_logger(),
        })
    }

    /// Create a client using the configured request timeout and retry settings
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut client = Self::new(config.request_timeout)?;
        client.set_retry(config.retry_policy());
        Ok(client)
    }

    /// Count every request attempt in `stats`
    pub fn with_stats(mut self, stats: Arc<ExecutionStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Send batch-fetch diagnostics to `logger`
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Set a header sent with every request, replacing any previous value
    ///
    /// Header names are case-insensitive and stored lowercased.
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers
            .insert(key.into().to_ascii_lowercase(), value.into());
    }

    /// Set several default headers
    pub fn set_headers<I, K, V>(&mut self, headers: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in headers {
            self.set_header(key, value);
        }
    }

    /// Default headers
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Replace the retry policy
    pub fn set_retry(&mut self, policy: RetryPolicy) {
        self.policy = policy;
    }

    /// Current retry policy
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a GET request
    pub async fn get(&self, cancel: &CancellationToken, url: &str) -> Result<Response> {
        self.request(cancel, Method::GET, url, None).await
    }

    /// Send a POST request with a raw body
    pub async fn post(
        &self,
        cancel: &CancellationToken,
        url: &str,
        body: impl Into<Vec<u8>>,
    ) -> Result<Response> {
        self.request(cancel, Method::POST, url, Some(body.into()))
            .await
    }

    /// Send a PUT request with a raw body
    pub async fn put(
        &self,
        cancel: &CancellationToken,
        url: &str,
        body: impl Into<Vec<u8>>,
    ) -> Result<Response> {
        self.request(cancel, Method::PUT, url, Some(body.into()))
            .await
    }

    /// Send a DELETE request
    pub async fn delete(&self, cancel: &CancellationToken, url: &str) -> Result<Response> {
        self.request(cancel, Method::DELETE, url, None).await
    }

    /// Send a request with the default headers under the retry policy
    ///
    /// The body is re-sent on every attempt. Responses with status < 500 are
    /// returned as-is; 5xx responses and transport failures are retried, and once
    /// the budget is spent the result is [`Error::RetriesExhausted`].
    pub async fn request(
        &self,
        cancel: &CancellationToken,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Response> {
        self.send(cancel, method, url, body, None).await
    }

    async fn send(
        &self,
        cancel: &CancellationToken,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
        content_type: Option<&str>,
    ) -> Result<Response> {
        let attempt = || {
            let mut request = self.client.request(method.clone(), url);
            for (key, value) in &self.headers {
                request = request.header(key, value);
            }
            if let Some(content_type) = content_type {
                request = request.header(reqwest::header::CONTENT_TYPE, content_type);
            }
            if let Some(body) = &body {
                request = request.body(body.clone());
            }
            if let Some(stats) = &self.stats {
                stats.inc_requests();
            }

            send_once(request)
        };

        retry_transient(cancel, &self.policy, attempt)
            .await
            .map_err(Error::from)
    }

    /// GET `url` and decode the JSON body
    ///
    /// Any status >= 400 is an [`Error::HttpStatus`].
    pub async fn get_json<T>(&self, cancel: &CancellationToken, url: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = self.get(cancel, url).await?;
        decode_json(cancel, response).await
    }

    /// POST `body` as JSON and decode the JSON response
    pub async fn post_json<B, T>(
        &self,
        cancel: &CancellationToken,
        url: &str,
        body: &B,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)?;
        let response = self
            .send(
                cancel,
                Method::POST,
                url,
                Some(payload),
                Some("application/json"),
            )
            .await?;
        decode_json(cancel, response).await
    }

    /// GET `url`, panicking on failure
    ///
    /// Meant for quick scripts only. Inside [`BaseSpider::execute`](crate::spider::BaseSpider::execute)
    /// the panic is contained and reported as [`Error::TaskPanicked`].
    ///
    /// # Panics
    ///
    /// Panics if the request fails after all retries or is cancelled.
    pub async fn must_get(&self, cancel: &CancellationToken, url: &str) -> Response {
        match self.get(cancel, url).await {
            Ok(response) => response,
            Err(e) => panic!("GET {url} failed: {}", e.report()),
        }
    }
}

async fn send_once(request: reqwest::RequestBuilder) -> Result<Response> {
    let response = request.send().await?;
    let status = response.status().as_u16();
    if status >= 500 {
        // Dropping the response discards its body
        return Err(Error::ServerStatus {
            status,
            url: response.url().to_string(),
        });
    }
    Ok(response)
}

/// Read a response body, observing cancellation
pub(crate) async fn read_body(cancel: &CancellationToken, response: Response) -> Result<Vec<u8>> {
    let url = response.url().to_string();
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled(CancelPoint::InFlight)),
        bytes = response.bytes() => bytes
            .map(|b| b.to_vec())
            .map_err(|source| Error::BodyRead { url, source }),
    }
}

async fn decode_json<T>(cancel: &CancellationToken, response: Response) -> Result<T>
where
    T: DeserializeOwned,
{
    let status = response.status().as_u16();
    if status >= 400 {
        return Err(Error::HttpStatus {
            status,
            url: response.url().to_string(),
        });
    }
    let body = read_body(cancel, response).await?;
    Ok(serde_json::from_slice(&body)?)
}
