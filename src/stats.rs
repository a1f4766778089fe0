//! Execution statistics for a spider run

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters shared between user code and the lifecycle's save/log paths
///
/// Every counter is an independent atomic; there is no ordering relationship
/// between different fields.
#[derive(Debug)]
pub struct ExecutionStats {
    items_saved: AtomicU64,
    requests: AtomicU64,
    errors: AtomicU64,
    started: Mutex<(Instant, DateTime<Utc>)>,
}

impl Default for ExecutionStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionStats {
    /// Create zeroed counters with the start time set to now
    pub fn new() -> Self {
        Self {
            items_saved: AtomicU64::new(0),
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            started: Mutex::new((Instant::now(), Utc::now())),
        }
    }

    /// Reset the start time to now
    pub fn mark_started(&self) {
        let mut started = match self.started.lock() {
            Ok(started) => started,
            Err(poisoned) => poisoned.into_inner(),
        };
        *started = (Instant::now(), Utc::now());
    }

    /// Add `count` saved items
    pub fn add_items(&self, count: u64) {
        self.items_saved.fetch_add(count, Ordering::Relaxed);
    }

    /// Count one issued request
    pub fn inc_requests(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one error
    pub fn inc_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Items saved so far
    pub fn items_saved(&self) -> u64 {
        self.items_saved.load(Ordering::Relaxed)
    }

    /// Requests issued so far
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Errors seen so far
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    fn started(&self) -> (Instant, DateTime<Utc>) {
        match self.started.lock() {
            Ok(started) => *started,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Wall-clock start time
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started().1
    }

    /// Time elapsed since the start
    pub fn elapsed(&self) -> Duration {
        self.started().0.elapsed()
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            items_saved: self.items_saved(),
            requests: self.requests(),
            errors: self.errors(),
            started_at: self.started_at(),
            elapsed: self.elapsed(),
        }
    }
}

/// Copy of [`ExecutionStats`] taken at one moment
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    /// Items saved
    pub items_saved: u64,
    /// Requests issued
    pub requests: u64,
    /// Errors seen
    pub errors: u64,
    /// Wall-clock start time
    pub started_at: DateTime<Utc>,
    /// Time elapsed since the start
    #[serde(serialize_with = "serialize_secs_f64")]
    pub elapsed: Duration,
}

fn serialize_secs_f64<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counters_start_at_zero() {
        let stats = ExecutionStats::new();
        assert_eq!(stats.items_saved(), 0);
        assert_eq!(stats.requests(), 0);
        assert_eq!(stats.errors(), 0);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let stats = Arc::new(ExecutionStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.add_items(2);
                        stats.inc_requests();
                        stats.inc_errors();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker thread panicked");
        }

        assert_eq!(stats.items_saved(), 16_000);
        assert_eq!(stats.requests(), 8_000);
        assert_eq!(stats.errors(), 8_000);
    }

    #[test]
    fn mark_started_resets_elapsed() {
        let stats = ExecutionStats::new();
        std::thread::sleep(Duration::from_millis(30));
        assert!(stats.elapsed() >= Duration::from_millis(30));

        let before = stats.started_at();
        stats.mark_started();
        assert!(stats.elapsed() < Duration::from_millis(30));
        assert!(stats.started_at() >= before);
    }

    #[test]
    fn snapshot_serializes_counters() {
        let stats = ExecutionStats::new();
        stats.add_items(3);
        stats.inc_errors();

        let json = serde_json::to_value(stats.snapshot()).expect("serialize failed");
        assert_eq!(json["items_saved"], 3);
        assert_eq!(json["requests"], 0);
        assert_eq!(json["errors"], 1);
        assert!(json["elapsed"].is_f64());
        assert!(json["started_at"].is_string());
    }
}
