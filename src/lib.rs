//! # crawlab-sdk
//!
//! Task runtime for spider worker processes launched by the Crawlab platform.
//!
//! A worker process runs one crawl task. It reads its identity and parameters
//! from the environment, reports crawled records as newline-delimited JSON
//! frames on stdout and writes diagnostics to stderr.
//!
//! ## Design Philosophy
//!
//! - **Frames stay intact** - every record or batch is one line, written in a
//!   single call; a failure never leaves half a frame on stdout
//! - **Failures are values** - network faults are retried, everything else is
//!   a [`Result`]; only a panic in task code is caught, at the lifecycle boundary
//! - **Cancellable everywhere** - every request and retry wait observes a
//!   [`CancellationToken`](tokio_util::sync::CancellationToken)
//! - **Sensible defaults** - works with no configuration beyond what the
//!   platform already sets
//!
//! ## Quick Start
//!
//! ```no_run
//! use async_trait::async_trait;
//! use crawlab_sdk::{BaseSpider, Result, Spider};
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Books;
//!
//! #[async_trait]
//! impl Spider for Books {
//!     async fn run(&self, spider: &BaseSpider, cancel: CancellationToken) -> Result<()> {
//!         let client = spider.http_client()?.with_stats(spider.stats());
//!         let body = client.get(&cancel, "https://books.example/").await?.text().await?;
//!         spider.save(&json!({ "length": body.len() }))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     BaseSpider::new("books").execute(&Books).await
//! }
//! ```
//!
//! Without a spider, records can be saved directly:
//!
//! ```no_run
//! crawlab_sdk::save_item(&serde_json::json!({ "title": "hello" }))?;
//! # Ok::<(), crawlab_sdk::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration loaded from the environment
pub mod config;
/// Task identity and parameters
pub mod context;
/// Error types
pub mod error;
/// HTTP client with retry and batch fetching
pub mod http;
/// IPC frames on stdout
pub mod ipc;
/// Stderr diagnostics
pub mod logging;
/// Retry logic with fixed and exponential backoff
pub mod retry;
/// Task lifecycle
pub mod spider;
/// Execution statistics
pub mod stats;

// Re-export commonly used types
pub use config::{Backoff, Config, RetryPolicy, env_bool, env_duration, env_int, env_or, require_env};
pub use context::TaskContext;
pub use error::{Error, ErrorClass, Result};
pub use http::{BodyReadPolicy, FetchOptions, FetchedPage, HttpClient};
pub use ipc::{IpcMessage, IpcTransport, MemorySink, save_batch, save_item, save_items};
pub use logging::{Level, Logger, MemoryLogger, StderrLogger, TracingLogger};
pub use retry::{CancelPoint, IsRetryable, RetryError, retry, retry_if, retry_transient};
pub use spider::{BaseSpider, BaseSpiderBuilder, LifecycleState, Spider};
pub use stats::{ExecutionStats, StatsSnapshot};
