//! Error types for crawlab-sdk
//!
//! Every fallible operation in the crate returns [`Result`]. Variants carry the
//! context needed to diagnose a failure without a stack trace: URLs, status codes,
//! attempt counts and the point at which a cancellation was observed.
//!
//! Errors fall into four classes, see [`ErrorClass`]:
//! - transient failures that the retry engine may re-run,
//! - terminal failures returned to the immediate caller,
//! - fatal task failures produced by the lifecycle boundary,
//! - cancellation.

use crate::retry::{CancelPoint, RetryError};
use thiserror::Error;

/// Result type alias for crawlab-sdk operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for crawlab-sdk
#[derive(Debug, Error)]
pub enum Error {
    /// A required environment variable is not set
    #[error("required environment variable {0} is not set")]
    MissingEnv(String),

    /// The task parameter string is empty
    #[error("task param is empty")]
    EmptyParam,

    /// The task parameter string is not valid JSON for the requested type
    #[error("failed to parse param JSON: {0}")]
    ParamDecode(#[source] serde_json::Error),

    /// Serialization error (IPC frames, JSON bodies)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (writing to the output stream)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level HTTP failure: connect, timeout, request construction
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a 5xx status
    #[error("server error: {status} from {url}")]
    ServerStatus {
        /// HTTP status code (>= 500)
        status: u16,
        /// Requested URL
        url: String,
    },

    /// A non-success status where the caller asked for a decoded body
    #[error("HTTP error: {status} from {url}")]
    HttpStatus {
        /// HTTP status code (>= 400)
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Reading a response body failed
    #[error("failed to read response body from {url}: {source}")]
    BodyRead {
        /// Requested URL
        url: String,
        /// Underlying transport error
        #[source]
        source: reqwest::Error,
    },

    /// Every attempt allowed by the retry policy failed
    ///
    /// The last failure is the error's `source`; [`Error::report`] prints both.
    #[error("all {attempts} attempts failed")]
    RetriesExhausted {
        /// Total number of attempts made
        attempts: u32,
        /// The last observed failure
        #[source]
        source: Box<Error>,
    },

    /// The governing scope was cancelled
    #[error("cancelled {0}")]
    Cancelled(CancelPoint),

    /// Task logic panicked and the panic was contained at the lifecycle boundary
    #[error("spider panicked: {0}")]
    TaskPanicked(String),

    /// Lifecycle operation attempted in the wrong state
    #[error("cannot {operation} spider in state {state}")]
    InvalidState {
        /// The attempted operation (e.g., "execute")
        operation: &'static str,
        /// The state the spider was in
        state: String,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Coarse failure class used for reporting and retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network or server fault, retried per policy
    Transient,
    /// Returned to the immediate caller, never retried
    Terminal,
    /// Task logic fault contained at the lifecycle boundary
    FatalToTask,
    /// The governing scope told the operation to stop
    Cancellation,
}

impl Error {
    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Network(_) | Error::ServerStatus { .. } => ErrorClass::Transient,
            Error::RetriesExhausted { source, .. } => match source.class() {
                ErrorClass::Cancellation => ErrorClass::Cancellation,
                _ => ErrorClass::Terminal,
            },
            Error::TaskPanicked(_) => ErrorClass::FatalToTask,
            Error::Cancelled(_) => ErrorClass::Cancellation,
            Error::MissingEnv(_)
            | Error::EmptyParam
            | Error::ParamDecode(_)
            | Error::Serialization(_)
            | Error::Io(_)
            | Error::HttpStatus { .. }
            | Error::BodyRead { .. }
            | Error::InvalidState { .. }
            | Error::Other(_) => ErrorClass::Terminal,
        }
    }

    /// True when the failure was caused by cancellation rather than a fault
    pub fn is_cancelled(&self) -> bool {
        self.class() == ErrorClass::Cancellation
    }

    /// This error followed by each error in its source chain, joined by `: `
    ///
    /// A cause whose text already ends the report is not repeated. Used for log
    /// lines, where the chain is not otherwise visible.
    pub fn report(&self) -> String {
        let mut report = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let text = cause.to_string();
            if !report.ends_with(&text) {
                report.push_str(": ");
                report.push_str(&text);
            }
            source = cause.source();
        }
        report
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::MissingEnv(_) => "missing_env",
            Error::EmptyParam => "empty_param",
            Error::ParamDecode(_) => "param_decode_error",
            Error::Serialization(_) => "serialization_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::ServerStatus { .. } => "server_error",
            Error::HttpStatus { .. } => "http_error",
            Error::BodyRead { .. } => "body_read_error",
            Error::RetriesExhausted { .. } => "retries_exhausted",
            Error::Cancelled(_) => "cancelled",
            Error::TaskPanicked(_) => "task_panicked",
            Error::InvalidState { .. } => "invalid_state",
            Error::Other(_) => "other",
        }
    }
}

impl From<RetryError<Error>> for Error {
    fn from(err: RetryError<Error>) -> Self {
        match err {
            RetryError::Exhausted { attempts, source } => Error::RetriesExhausted {
                attempts,
                source: Box::new(source),
            },
            RetryError::Rejected(source) => source,
            RetryError::Cancelled(point) => Error::Cancelled(point),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn exhausted_retry_keeps_last_failure_as_source() {
        let err: Error = RetryError::Exhausted {
            attempts: 3,
            source: Error::ServerStatus {
                status: 503,
                url: "http://example.com/".into(),
            },
        }
        .into();

        assert_eq!(err.error_code(), "retries_exhausted");
        assert_eq!(err.to_string(), "all 3 attempts failed");

        let source = err.source().map(|s| s.to_string());
        assert_eq!(
            source.as_deref(),
            Some("server error: 503 from http://example.com/")
        );
    }

    #[test]
    fn report_prints_each_cause_once() {
        let err: Error = RetryError::Exhausted {
            attempts: 2,
            source: Error::ServerStatus {
                status: 502,
                url: "http://example.com/".into(),
            },
        }
        .into();

        let report = err.report();
        assert_eq!(
            report,
            "all 2 attempts failed: server error: 502 from http://example.com/"
        );
        assert_eq!(report.matches("502").count(), 1);
        assert_eq!(Error::EmptyParam.report(), "task param is empty");

        let decode = serde_json::from_str::<u32>("nope").unwrap_err();
        let err = Error::Serialization(decode);
        assert_eq!(err.report(), err.to_string());
    }

    #[test]
    fn rejected_retry_is_unwrapped() {
        let err: Error = RetryError::Rejected(Error::EmptyParam).into();
        assert!(matches!(err, Error::EmptyParam));
    }

    #[test]
    fn cancelled_retry_is_distinct_from_exhaustion() {
        let err: Error = RetryError::<Error>::Cancelled(CancelPoint::DuringDelay).into();
        assert!(err.is_cancelled());
        assert_eq!(err.class(), ErrorClass::Cancellation);
        assert_eq!(err.to_string(), "cancelled during retry delay");
    }

    #[test]
    fn classes_follow_the_failure_taxonomy() {
        let transient = Error::ServerStatus {
            status: 500,
            url: "http://x/".into(),
        };
        assert_eq!(transient.class(), ErrorClass::Transient);

        let terminal = Error::HttpStatus {
            status: 404,
            url: "http://x/".into(),
        };
        assert_eq!(terminal.class(), ErrorClass::Terminal);

        assert_eq!(
            Error::TaskPanicked("boom".into()).class(),
            ErrorClass::FatalToTask
        );

        let exhausted = Error::RetriesExhausted {
            attempts: 2,
            source: Box::new(transient),
        };
        assert_eq!(exhausted.class(), ErrorClass::Terminal);
        assert!(!exhausted.is_cancelled());
    }

    #[test]
    fn param_errors_have_readable_messages() {
        assert_eq!(Error::EmptyParam.to_string(), "task param is empty");

        let decode = serde_json::from_str::<u32>("nope").unwrap_err();
        let err = Error::ParamDecode(decode);
        assert!(err.to_string().starts_with("failed to parse param JSON"));
        assert_eq!(err.class(), ErrorClass::Terminal);
    }

    #[test]
    fn missing_env_names_the_variable() {
        let err = Error::MissingEnv("CRAWLAB_TASK_ID".into());
        assert_eq!(
            err.to_string(),
            "required environment variable CRAWLAB_TASK_ID is not set"
        );
    }
}
