//! Retry engine with fixed delay or exponential backoff
//!
//! Runs an async operation until it succeeds, the [`RetryPolicy`] budget is spent,
//! or the governing [`CancellationToken`] fires. Cancellation is observed before
//! every attempt, while an attempt is in flight, and during every wait, so a
//! cancelled task never sleeps out a full delay.
//!
//! # Example
//!
//! ```no_run
//! use crawlab_sdk::config::RetryPolicy;
//! use crawlab_sdk::retry::{RetryError, retry};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), RetryError<std::io::Error>> {
//! let cancel = CancellationToken::new();
//! let policy = RetryPolicy::exponential(3, Duration::from_millis(100), Duration::from_secs(2));
//!
//! let value = retry(&cancel, &policy, || async {
//!     // Your operation here
//!     Ok::<_, std::io::Error>(42)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryPolicy;
use crate::error::Error;
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (unreachable server, timeout, 5xx) should return `true`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        matches!(self, Error::Network(_) | Error::ServerStatus { .. })
    }
}

/// Where a cancellation was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelPoint {
    /// The scope was already cancelled when an attempt was about to start
    BeforeAttempt,
    /// The scope was cancelled while an attempt was running
    InFlight,
    /// The scope was cancelled while waiting between attempts
    DuringDelay,
}

impl fmt::Display for CancelPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CancelPoint::BeforeAttempt => "before attempt",
            CancelPoint::InFlight => "while in flight",
            CancelPoint::DuringDelay => "during retry delay",
        })
    }
}

/// Failure returned by the retry engine
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt failed; `source` is the last failure
    #[error("all {attempts} attempts failed")]
    Exhausted {
        /// Total number of attempts made
        attempts: u32,
        /// The last observed failure
        #[source]
        source: E,
    },

    /// The retry predicate declined to retry this failure
    #[error(transparent)]
    Rejected(E),

    /// The governing scope was cancelled
    #[error("retry cancelled {0}")]
    Cancelled(CancelPoint),
}

impl<E> RetryError<E> {
    /// The underlying operation failure, if the engine gave up because of one
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::Rejected(source) => Some(source),
            RetryError::Cancelled(_) => None,
        }
    }

    /// True when the engine stopped because of cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled(_))
    }
}

/// Execute an async operation, retrying every failure per `policy`
///
/// The operation runs at most `policy.max_retries + 1` times. Returns the first
/// success, [`RetryError::Exhausted`] wrapping the last failure, or
/// [`RetryError::Cancelled`].
pub async fn retry<F, Fut, T, E>(
    cancel: &CancellationToken,
    policy: &RetryPolicy,
    operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    retry_if(cancel, policy, |_| true, operation).await
}

/// Execute an async operation, retrying only failures that report [`IsRetryable`]
pub async fn retry_transient<F, Fut, T, E>(
    cancel: &CancellationToken,
    policy: &RetryPolicy,
    operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + fmt::Display,
{
    retry_if(cancel, policy, |e: &E| e.is_retryable(), operation).await
}

/// Execute an async operation, retrying while `should_retry` accepts the failure
///
/// A failure rejected by `should_retry` is returned immediately as
/// [`RetryError::Rejected`], whatever budget remains.
pub async fn retry_if<F, Fut, T, E, P>(
    cancel: &CancellationToken,
    policy: &RetryPolicy,
    mut should_retry: P,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
    P: FnMut(&E) -> bool,
{
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled(CancelPoint::BeforeAttempt));
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(RetryError::Cancelled(CancelPoint::InFlight));
            }
            outcome = operation() => outcome,
        };

        let e = match outcome {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(attempts = attempt + 1, "Retry succeeded");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !should_retry(&e) {
            tracing::warn!(error = %e, "Error is not retryable");
            return Err(RetryError::Rejected(e));
        }

        if attempt >= policy.max_retries {
            tracing::error!(
                error = %e,
                attempts = attempt + 1,
                "Operation failed after all retry attempts exhausted"
            );
            return Err(RetryError::Exhausted {
                attempts: attempt + 1,
                source: e,
            });
        }

        let delay = if policy.jitter {
            add_jitter(policy.delay_for(attempt))
        } else {
            policy.delay_for(attempt)
        };

        tracing::warn!(
            error = %e,
            attempt = attempt + 1,
            max_attempts = policy.max_attempts(),
            delay_ms = delay.as_millis(),
            "Attempt failed, retrying"
        );

        if !delay.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled(CancelPoint::DuringDelay));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        attempt += 1;
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
