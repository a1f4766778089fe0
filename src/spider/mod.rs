//! Task lifecycle wrapper around user spider logic
//!
//! A [`BaseSpider`] owns everything a task needs besides its own logic: the
//! task identity, configuration, statistics, the IPC transport and a logger.
//! User code implements [`Spider`] and hands itself to [`BaseSpider::execute`],
//! which runs it inside a cancellable scope:
//!
//! ```no_run
//! use async_trait::async_trait;
//! use crawlab_sdk::{BaseSpider, Result, Spider};
//! use tokio_util::sync::CancellationToken;
//!
//! struct Quotes;
//!
//! #[async_trait]
//! impl Spider for Quotes {
//!     async fn run(&self, spider: &BaseSpider, cancel: CancellationToken) -> Result<()> {
//!         let client = spider.http_client()?.with_stats(spider.stats());
//!         let page = client.get(&cancel, "https://quotes.example/").await?;
//!         spider.save(&serde_json::json!({ "status": page.status().as_u16() }))
//!     }
//! }
//!
//! # async fn demo() -> Result<()> {
//! BaseSpider::new("quotes").execute(&Quotes).await
//! # }
//! ```
//!
//! Whatever the task does, including panicking, the spider ends up
//! [`LifecycleState::Finished`] with its statistics printed.

use crate::config::Config;
use crate::context::TaskContext;
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::ipc::{IpcTransport, stdout_transport};
use crate::logging::{Logger, default_logger};
use crate::stats::ExecutionStats;
use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// User task logic run by [`BaseSpider::execute`]
#[async_trait]
pub trait Spider: Send + Sync {
    /// Run the task
    ///
    /// `spider` gives access to saving, logging and statistics. `cancel` is the
    /// task's scope; pass it to every request and stop promptly once it fires.
    async fn run(&self, spider: &BaseSpider, cancel: CancellationToken) -> Result<()>;
}

/// Where a spider is in its one-shot lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Built, not yet executed
    Created,
    /// Task logic is running
    Running,
    /// Task logic returned, failed or panicked
    Finished,
}

impl LifecycleState {
    /// Lowercase state name
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Created => "created",
            LifecycleState::Running => "running",
            LifecycleState::Finished => "finished",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builder for [`BaseSpider`]
///
/// Anything not set falls back to the process defaults: configuration from the
/// environment, the stdout transport and the process-wide logger.
#[must_use]
pub struct BaseSpiderBuilder {
    name: String,
    config: Option<Config>,
    transport: Option<Arc<IpcTransport>>,
    logger: Option<Arc<dyn Logger>>,
    cancel: Option<CancellationToken>,
}

impl BaseSpiderBuilder {
    /// Use an explicit configuration instead of reading the environment
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Write frames to `transport`
    pub fn transport(mut self, transport: Arc<IpcTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Send diagnostics to `logger`
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Derive the task scope from `token`, so cancelling it stops the task
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Build the spider
    pub fn build(self) -> BaseSpider {
        let logger = self.logger.unwrap_or_else(default_logger);
        let config = match self.config {
            Some(config) => config,
            None => Config::load(|key| std::env::var(key).ok(), logger.as_ref()),
        };

        BaseSpider {
            name: self.name,
            context: TaskContext::from(&config),
            config,
            stats: Arc::new(ExecutionStats::new()),
            transport: self.transport.unwrap_or_else(stdout_transport),
            logger,
            base_token: self.cancel.unwrap_or_default(),
            scope: Mutex::new(None),
            state: Mutex::new(LifecycleState::Created),
        }
    }
}

/// Managed, statistics-tracked runtime for one crawl task
pub struct BaseSpider {
    name: String,
    context: TaskContext,
    config: Config,
    stats: Arc<ExecutionStats>,
    transport: Arc<IpcTransport>,
    logger: Arc<dyn Logger>,
    base_token: CancellationToken,
    scope: Mutex<Option<CancellationToken>>,
    state: Mutex<LifecycleState>,
}

impl fmt::Debug for BaseSpider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseSpider")
            .field("name", &self.name)
            .field("context", &self.context)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl BaseSpider {
    /// Create a spider with the process defaults
    pub fn new(name: impl Into<String>) -> Self {
        Self::builder(name).build()
    }

    /// Start building a spider
    pub fn builder(name: impl Into<String>) -> BaseSpiderBuilder {
        BaseSpiderBuilder {
            name: name.into(),
            config: None,
            transport: None,
            logger: None,
            cancel: None,
        }
    }

    /// Run `task` once, containing any panic
    ///
    /// The task gets a child of the spider's base token. On return, error or
    /// panic the spider becomes [`LifecycleState::Finished`], the statistics
    /// report is logged and the child token is cancelled, so work the task
    /// spawned on that scope is told to stop.
    ///
    /// A panic becomes [`Error::TaskPanicked`]. Calling `execute` a second time
    /// returns [`Error::InvalidState`] without running anything.
    pub async fn execute<S>(&self, task: &S) -> Result<()>
    where
        S: Spider + ?Sized,
    {
        {
            let mut state = lock(&self.state);
            if *state != LifecycleState::Created {
                return Err(Error::InvalidState {
                    operation: "execute",
                    state: state.to_string(),
                });
            }
            *state = LifecycleState::Running;
        }

        let scope = self.base_token.child_token();
        *lock(&self.scope) = Some(scope.clone());
        self.stats.mark_started();

        self.log_info(&format!("Starting spider: {}", self.name));
        self.log_info(&format!("Task ID: {}", self.context.task_id()));
        self.log_info(&format!("Spider ID: {}", self.context.spider_id()));

        let outcome = AssertUnwindSafe(task.run(self, scope.clone()))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(())) => {
                self.log_info("Spider finished");
                Ok(())
            }
            Ok(Err(e)) => {
                self.log_error(&format!("Spider failed: {}", e.report()));
                Err(e)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.log_error(&format!("Spider panicked: {message}"));
                Err(Error::TaskPanicked(message))
            }
        };

        *lock(&self.state) = LifecycleState::Finished;
        self.print_stats();
        scope.cancel();

        result
    }

    /// Save one record as a single-item frame
    pub fn save<T>(&self, record: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        match self.transport.emit(record) {
            Ok(()) => {
                self.stats.add_items(1);
                Ok(())
            }
            Err(e) => {
                self.stats.inc_errors();
                Err(e)
            }
        }
    }

    /// Save all records as one array frame
    pub fn save_batch<T>(&self, records: &[T]) -> Result<()>
    where
        T: Serialize,
    {
        match self.transport.emit_many(records) {
            Ok(()) => {
                self.stats.add_items(records.len() as u64);
                Ok(())
            }
            Err(e) => {
                self.stats.inc_errors();
                Err(e)
            }
        }
    }

    /// Save records as consecutive batch frames of at most `chunk_size` records
    ///
    /// A `chunk_size` of zero is treated as one. Stops at the first chunk that
    /// fails; chunks already written stay counted.
    pub fn save_chunked<T>(&self, records: &[T], chunk_size: usize) -> Result<()>
    where
        T: Serialize,
    {
        let total = records.len();
        let chunk_size = chunk_size.max(1);
        for (index, chunk) in records.chunks(chunk_size).enumerate() {
            self.save_batch(chunk)?;
            let done = (index * chunk_size + chunk.len()).min(total);
            self.log_debug(&format!("Saved chunk {index} ({done}/{total})"));
        }
        Ok(())
    }

    /// Log at INFO, prefixed with the spider name
    pub fn log_info(&self, message: &str) {
        self.logger.info(&self.prefixed(message));
    }

    /// Log at WARN, prefixed with the spider name
    pub fn log_warn(&self, message: &str) {
        self.logger.warn(&self.prefixed(message));
    }

    /// Log at DEBUG, prefixed with the spider name
    pub fn log_debug(&self, message: &str) {
        self.logger.debug(&self.prefixed(message));
    }

    /// Log at ERROR, prefixed with the spider name
    ///
    /// Also counts one error in the statistics.
    pub fn log_error(&self, message: &str) {
        self.stats.inc_errors();
        self.logger.error(&self.prefixed(message));
    }

    fn prefixed(&self, message: &str) -> String {
        format!("[{}] {message}", self.name)
    }

    /// Count one request
    pub fn inc_requests(&self) {
        self.stats.inc_requests();
    }

    /// Count one error
    pub fn inc_errors(&self) {
        self.stats.inc_errors();
    }

    /// Shared statistics handle
    pub fn stats(&self) -> Arc<ExecutionStats> {
        Arc::clone(&self.stats)
    }

    /// Time since the task started
    pub fn duration(&self) -> Duration {
        self.stats.elapsed()
    }

    /// Log the statistics report
    pub fn print_stats(&self) {
        let snapshot = self.stats.snapshot();
        self.log_info("========== Stats ==========");
        self.log_info(&format!("Duration: {:?}", snapshot.elapsed));
        self.log_info(&format!("Items saved: {}", snapshot.items_saved));
        self.log_info(&format!("Requests: {}", snapshot.requests));
        self.log_info(&format!("Errors: {}", snapshot.errors));
        self.log_info("===========================");
    }

    /// Spider name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Task identity
    pub fn context(&self) -> &TaskContext {
        &self.context
    }

    /// Configuration the spider was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        *lock(&self.state)
    }

    /// Cancel the running task scope
    ///
    /// Before `execute` this cancels the base token, so the task starts
    /// already cancelled.
    pub fn cancel(&self) {
        match lock(&self.scope).as_ref() {
            Some(scope) => scope.cancel(),
            None => self.base_token.cancel(),
        }
    }

    /// Decode the task parameter as JSON
    pub fn parse_param<T: DeserializeOwned>(&self) -> Result<T> {
        self.context.parse_param()
    }

    /// HTTP client using the configured timeout and retry settings
    ///
    /// Batch-fetch diagnostics go to the spider's logger. Attach
    /// [`stats`](Self::stats) with [`HttpClient::with_stats`] to count requests.
    pub fn http_client(&self) -> Result<HttpClient> {
        Ok(HttpClient::from_config(&self.config)?.with_logger(Arc::clone(&self.logger)))
    }
}

#[cfg(test)]
mod tests;
