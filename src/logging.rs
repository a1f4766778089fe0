//! Diagnostic logging for spider processes
//!
//! The platform captures a worker's stderr as the task log. Every line written by
//! [`StderrLogger`] has the shape `[Crawlab] [LEVEL] message`, keeping the data
//! channel on stdout free of anything but IPC frames.
//!
//! Components hold an `Arc<dyn Logger>` instead of writing to a global stream so
//! tests can swap in a [`MemoryLogger`] and inspect exactly what was logged.

use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex, OnceLock};

/// Fixed prefix of every diagnostic line
pub const LOG_PREFIX: &str = "[Crawlab]";

/// Severity of a diagnostic line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Progress information
    Info,
    /// Something unexpected that did not stop the task
    Warn,
    /// A failure
    Error,
    /// Verbose detail
    Debug,
}

impl Level {
    /// The marker written between brackets, e.g. `WARN`
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Debug => "DEBUG",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format one diagnostic line (without the trailing newline)
pub fn format_line(level: Level, message: &str) -> String {
    format!("{LOG_PREFIX} [{level}] {message}")
}

/// Logging collaborator injected into the transport, config loader and spider
pub trait Logger: Send + Sync {
    /// Write one message at the given level
    fn log(&self, level: Level, message: &str);

    /// Log at INFO
    fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    /// Log at WARN
    fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    /// Log at ERROR
    fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }

    /// Log at DEBUG
    fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }
}

/// Writes `[Crawlab] [LEVEL] message` lines to the process stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrLogger;

impl Logger for StderrLogger {
    fn log(&self, level: Level, message: &str) {
        let line = format_line(level, message);
        // Write failures on a closed stderr are ignored
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }
}

/// Forwards every message to `tracing` for hosts that install a subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::Info => tracing::info!(target: "crawlab", "{message}"),
            Level::Warn => tracing::warn!(target: "crawlab", "{message}"),
            Level::Error => tracing::error!(target: "crawlab", "{message}"),
            Level::Debug => tracing::debug!(target: "crawlab", "{message}"),
        }
    }
}

/// Keeps every message in memory
///
/// Useful when testing spiders: inject it through
/// [`BaseSpider::builder`](crate::spider::BaseSpider::builder) and assert on
/// [`MemoryLogger::entries`].
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<(Level, String)>>,
}

impl MemoryLogger {
    /// Create an empty logger
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every message logged so far
    pub fn entries(&self) -> Vec<(Level, String)> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Messages logged at `level`
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }

    /// Number of messages at `level` containing `needle`
    pub fn count_containing(&self, level: Level, needle: &str) -> usize {
        self.messages(level)
            .iter()
            .filter(|m| m.contains(needle))
            .count()
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: Level, message: &str) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.push((level, message.to_string()));
    }
}

static DEFAULT_LOGGER: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// The process-wide logger components fall back to when none is injected
pub fn default_logger() -> Arc<dyn Logger> {
    DEFAULT_LOGGER
        .get_or_init(|| Arc::new(StderrLogger))
        .clone()
}

/// Log at INFO through the process-wide logger
pub fn info(message: impl AsRef<str>) {
    default_logger().info(message.as_ref());
}

/// Log at WARN through the process-wide logger
pub fn warn(message: impl AsRef<str>) {
    default_logger().warn(message.as_ref());
}

/// Log at ERROR through the process-wide logger
pub fn error(message: impl AsRef<str>) {
    default_logger().error(message.as_ref());
}

/// Log at DEBUG through the process-wide logger
pub fn debug(message: impl AsRef<str>) {
    default_logger().debug(message.as_ref());
}
