//! Configuration types for crawlab-sdk
//!
//! The platform hands a worker its identity and tuning knobs through `CRAWLAB_*`
//! environment variables. [`Config::from_env`] reads all of them, falling back to
//! a default (with a warning) whenever a value is missing or unparsable. Loading
//! never fails.

use crate::error::{Error, Result};
use crate::logging::{Logger, default_logger};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable holding the task id
pub const ENV_TASK_ID: &str = "CRAWLAB_TASK_ID";
/// Environment variable holding the spider id
pub const ENV_SPIDER_ID: &str = "CRAWLAB_SPIDER_ID";
/// Environment variable holding the worker node id
pub const ENV_NODE_ID: &str = "CRAWLAB_NODE_ID";
/// Environment variable holding the raw task parameter string
pub const ENV_PARAM: &str = "CRAWLAB_TASK_PARAM";
/// Environment variable holding the schedule id
pub const ENV_SCHEDULE_ID: &str = "CRAWLAB_SCHEDULE_ID";
/// Override for [`Config::max_retries`]
pub const ENV_MAX_RETRIES: &str = "CRAWLAB_MAX_RETRIES";
/// Override for [`Config::retry_delay`]
pub const ENV_RETRY_DELAY: &str = "CRAWLAB_RETRY_DELAY";
/// Override for [`Config::request_timeout`]
pub const ENV_REQUEST_TIMEOUT: &str = "CRAWLAB_REQUEST_TIMEOUT";
/// Override for [`Config::max_concurrency`]
pub const ENV_MAX_CONCURRENCY: &str = "CRAWLAB_MAX_CONCURRENCY";
/// Override for [`Config::batch_size`]
pub const ENV_BATCH_SIZE: &str = "CRAWLAB_BATCH_SIZE";

/// Delay strategy between retry attempts
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Wait the same delay before every retry
    Fixed {
        /// Delay between attempts
        #[serde(with = "duration_ms")]
        delay: Duration,
    },
    /// Wait `initial * 2^k` before retry `k`, capped at `max`
    Exponential {
        /// Delay before the first retry
        #[serde(with = "duration_ms")]
        initial: Duration,
        /// Upper bound for any single delay
        #[serde(with = "duration_ms")]
        max: Duration,
    },
}

/// Retry policy for the retry engine and the HTTP client
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt (0 = no retry)
    #[serde(default)]
    pub max_retries: u32,

    /// Delay strategy between attempts
    pub backoff: Backoff,

    /// Stretch every delay by a random factor in `[1, 2]` (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(0, default_retry_delay())
    }
}

impl RetryPolicy {
    /// A single attempt, no retries
    pub fn none() -> Self {
        Self::default()
    }

    /// `max_retries` retries with a fixed delay
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed { delay },
            jitter: false,
        }
    }

    /// `max_retries` retries with exponential backoff
    pub fn exponential(max_retries: u32, initial: Duration, max: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Exponential { initial, max },
            jitter: false,
        }
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Total number of attempts this policy allows
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay to wait after the failed attempt `attempt` (0-indexed), before jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed { delay } => delay,
            Backoff::Exponential { initial, max } => 2u32
                .checked_pow(attempt)
                .and_then(|factor| initial.checked_mul(factor))
                .map_or(max, |delay| delay.min(max)),
        }
    }
}

/// Spider process configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Task id (`CRAWLAB_TASK_ID`)
    #[serde(default)]
    pub task_id: String,

    /// Spider id (`CRAWLAB_SPIDER_ID`)
    #[serde(default)]
    pub spider_id: String,

    /// Worker node id (`CRAWLAB_NODE_ID`)
    #[serde(default)]
    pub node_id: String,

    /// Raw task parameter string (`CRAWLAB_TASK_PARAM`)
    #[serde(default)]
    pub param: String,

    /// Schedule id (`CRAWLAB_SCHEDULE_ID`)
    #[serde(default)]
    pub schedule_id: String,

    /// Maximum retries for HTTP requests (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between HTTP retries (default: 2 seconds)
    #[serde(default = "default_retry_delay", with = "duration_ms")]
    pub retry_delay: Duration,

    /// HTTP request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_ms")]
    pub request_timeout: Duration,

    /// Concurrency hint for batch fetching (default: 10)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Records per IPC batch when saving in chunks (default: 100)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            task_id: String::new(),
            spider_id: String::new(),
            node_id: String::new(),
            param: String::new(),
            schedule_id: String::new(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            request_timeout: default_request_timeout(),
            max_concurrency: default_max_concurrency(),
            batch_size: default_batch_size(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    ///
    /// Warnings about unparsable or out-of-range values go to the process-wide logger.
    pub fn from_env() -> Self {
        Self::load(|key| std::env::var(key).ok(), default_logger().as_ref())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// Counts and durations are read as signed values, so a negative override
    /// is clamped (retries and delay to 0, concurrency and batch size to 1,
    /// timeout to 30s) with a warning instead of being rejected. The result is
    /// already validated.
    pub fn load<L>(lookup: L, logger: &dyn Logger) -> Self
    where
        L: Fn(&str) -> Option<String>,
    {
        let env = Env {
            lookup: &lookup,
            logger,
        };
        let defaults = Self::default();

        let mut config = Self {
            task_id: env.string(ENV_TASK_ID),
            spider_id: env.string(ENV_SPIDER_ID),
            node_id: env.string(ENV_NODE_ID),
            param: env.string(ENV_PARAM),
            schedule_id: env.string(ENV_SCHEDULE_ID),
            max_retries: non_negative(
                env.int(ENV_MAX_RETRIES, i64::from(defaults.max_retries)),
                logger,
            ),
            retry_delay: env
                .duration(ENV_RETRY_DELAY, defaults.retry_delay)
                .unwrap_or_else(|| {
                    logger.warn("RetryDelay is negative, setting to 0");
                    Duration::ZERO
                }),
            request_timeout: env
                .duration(ENV_REQUEST_TIMEOUT, defaults.request_timeout)
                .unwrap_or_else(|| {
                    logger.warn("RequestTimeout is negative, setting to 30s");
                    default_request_timeout()
                }),
            max_concurrency: at_least_one(
                "MaxConcurrency",
                env.int(ENV_MAX_CONCURRENCY, signed(defaults.max_concurrency)),
                logger,
            ),
            batch_size: at_least_one(
                "BatchSize",
                env.int(ENV_BATCH_SIZE, signed(defaults.batch_size)),
                logger,
            ),
        };
        config.validate(logger);
        config
    }

    /// Clamp values that would make the SDK misbehave, warning about each change
    pub fn validate(&mut self, logger: &dyn Logger) {
        if self.request_timeout.is_zero() {
            logger.warn("RequestTimeout is zero, setting to 30s");
            self.request_timeout = default_request_timeout();
        }

        if self.max_concurrency < 1 {
            logger.warn("MaxConcurrency is less than 1, setting to 1");
            self.max_concurrency = 1;
        }

        if self.batch_size < 1 {
            logger.warn("BatchSize is less than 1, setting to 1");
            self.batch_size = 1;
        }
    }

    /// Fixed-delay retry policy built from `max_retries` and `retry_delay`
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_retries, self.retry_delay)
    }

    /// Log every setting
    pub fn print(&self, logger: &dyn Logger) {
        logger.info("========== Config ==========");
        logger.info(&format!("TaskID: {}", self.task_id));
        logger.info(&format!("SpiderID: {}", self.spider_id));
        logger.info(&format!("NodeID: {}", self.node_id));
        logger.info(&format!("ScheduleID: {}", self.schedule_id));
        logger.info(&format!("MaxRetries: {}", self.max_retries));
        logger.info(&format!("RetryDelay: {:?}", self.retry_delay));
        logger.info(&format!("RequestTimeout: {:?}", self.request_timeout));
        logger.info(&format!("MaxConcurrency: {}", self.max_concurrency));
        logger.info(&format!("BatchSize: {}", self.batch_size));
        logger.info("============================");
    }
}

struct Env<'a, L> {
    lookup: &'a L,
    logger: &'a dyn Logger,
}

impl<L> Env<'_, L>
where
    L: Fn(&str) -> Option<String>,
{
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str) -> String {
        self.raw(key).unwrap_or_default()
    }

    fn int<T>(&self, key: &str, default: T) -> T
    where
        T: FromStr + std::fmt::Display,
        T::Err: std::fmt::Display,
    {
        let Some(raw) = self.raw(key) else {
            return default;
        };
        match raw.trim().parse() {
            Ok(value) => value,
            Err(e) => {
                self.logger.warn(&format!(
                    "Failed to parse {key} as int: {e}, using default {default}"
                ));
                default
            }
        }
    }

    /// `None` when the value is a valid negative duration
    fn duration(&self, key: &str, default: Duration) -> Option<Duration> {
        let Some(raw) = self.raw(key) else {
            return Some(default);
        };
        match parse_signed_duration(&raw) {
            Some((false, value)) => Some(value),
            Some((true, value)) if value.is_zero() => Some(Duration::ZERO),
            Some((true, _)) => None,
            None => {
                self.logger.warn(&format!(
                    "Failed to parse {key} as duration: invalid duration {raw:?}, using default {default:?}"
                ));
                Some(default)
            }
        }
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or_else(|| default.to_string())
    }

    fn require(&self, key: &str) -> Result<String> {
        self.raw(key)
            .ok_or_else(|| Error::MissingEnv(key.to_string()))
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        let Some(raw) = self.raw(key) else {
            return default;
        };
        match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => {
                self.logger.warn(&format!(
                    "Unknown boolean value for {key}: {raw}, using default {default}"
                ));
                default
            }
        }
    }
}

fn non_negative(value: i64, logger: &dyn Logger) -> u32 {
    if value < 0 {
        logger.warn("MaxRetries is negative, setting to 0");
        return 0;
    }
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn at_least_one(name: &str, value: i64, logger: &dyn Logger) -> usize {
    if value < 1 {
        logger.warn(&format!("{name} is less than 1, setting to 1"));
        return 1;
    }
    usize::try_from(value).unwrap_or(usize::MAX)
}

fn signed(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn with_process_env<R>(f: impl FnOnce(&Env<'_, fn(&str) -> Option<String>>) -> R) -> R {
    let lookup: fn(&str) -> Option<String> = |key| std::env::var(key).ok();
    let logger = default_logger();
    f(&Env {
        lookup: &lookup,
        logger: logger.as_ref(),
    })
}

/// Read an integer variable, falling back to `default` when missing or unparsable
pub fn env_int<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    with_process_env(|env| env.int(key, default))
}

/// Read a duration variable (`500ms`, `2s`, `1m30s`, `1.5h`)
///
/// A negative value falls back to `default` with a warning.
pub fn env_duration(key: &str, default: Duration) -> Duration {
    with_process_env(|env| {
        env.duration(key, default).unwrap_or_else(|| {
            env.logger
                .warn(&format!("{key} is negative, using default {default:?}"));
            default
        })
    })
}

/// Read a boolean variable: `true/1/yes/on` or `false/0/no/off`, case-insensitive
pub fn env_bool(key: &str, default: bool) -> bool {
    with_process_env(|env| env.bool(key, default))
}

/// Read a string variable, falling back to `default` when missing or empty
pub fn env_or(key: &str, default: &str) -> String {
    with_process_env(|env| env.or(key, default))
}

/// Read a variable that must be set and non-empty
pub fn require_env(key: &str) -> Result<String> {
    with_process_env(|env| env.require(key))
}

/// Parse a duration string made of `<number><unit>` terms
///
/// Units: `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`. Terms may carry a fraction and be
/// chained (`1h30m`). A bare `0` is accepted. Negative values are rejected.
pub fn parse_duration(input: &str) -> Option<Duration> {
    match parse_signed_duration(input)? {
        (true, value) if !value.is_zero() => None,
        (_, value) => Some(value),
    }
}

/// Like [`parse_duration`], also accepting a leading `-`; the flag is true when present
fn parse_signed_duration(input: &str) -> Option<(bool, Duration)> {
    let s = input.trim();
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    if s == "0" {
        return Some((negative, Duration::ZERO));
    }
    if s.is_empty() {
        return None;
    }

    let mut total = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total += value * nanos_per_unit;
    }

    if !total.is_finite() || total > u64::MAX as f64 {
        return None;
    }
    Some((negative, Duration::from_nanos(total.round() as u64)))
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_concurrency() -> usize {
    10
}

fn default_batch_size() -> usize {
    100
}

// Duration serialization helper (milliseconds)
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
