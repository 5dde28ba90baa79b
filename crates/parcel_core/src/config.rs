//! Store tuning knobs.
//!
//! # Responsibility
//! - Carry connection busy timeout and transient-failure retry settings.
//! - Load overrides from process environment for embedding callers.
//!
//! # Invariants
//! - Defaults reproduce single-attempt behavior (no retries).
//! - `max_attempts` is never below 1 once normalized.
//! - `busy_timeout_ms` accepted from the environment never exceeds
//!   [`MAX_BUSY_TIMEOUT_MS`], the largest timeout SQLite can represent.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub const ENV_BUSY_TIMEOUT_MS: &str = "PARCEL_DB_BUSY_TIMEOUT_MS";
pub const ENV_RETRY_ATTEMPTS: &str = "PARCEL_DB_RETRY_ATTEMPTS";
pub const ENV_RETRY_BACKOFF_MS: &str = "PARCEL_DB_RETRY_BACKOFF_MS";

/// SQLite stores the busy timeout as a signed 32-bit millisecond count.
pub const MAX_BUSY_TIMEOUT_MS: u64 = i32::MAX as u64;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 50;

/// Error raised when a configuration value cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid value `{}` for `{}`; expected {}",
            self.value, self.key, self.expected
        )
    }
}

impl Error for ConfigError {}

/// Retry policy for statements rejected with `SQLITE_BUSY` / `SQLITE_LOCKED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total executions per statement, including the first one.
    pub max_attempts: u32,
    /// Base delay between attempts; grows linearly with the attempt number.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    /// Effective attempt count, treating `0` as a single attempt.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to sleep after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Connection and store settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long SQLite waits on a locked database before reporting busy.
    pub busy_timeout_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            retry: RetryPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// Builds a config from defaults overridden by `PARCEL_DB_*` variables.
    ///
    /// # Errors
    /// - Returns [`ConfigError`] when a set variable is not a non-negative integer
    ///   or is outside the range its setting supports.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = parse_var(&lookup, ENV_BUSY_TIMEOUT_MS)? {
            if value > MAX_BUSY_TIMEOUT_MS {
                return Err(ConfigError {
                    key: ENV_BUSY_TIMEOUT_MS,
                    value: value.to_string(),
                    expected: "at most 2147483647 milliseconds",
                });
            }
            config.busy_timeout_ms = value;
        }
        if let Some(value) = parse_var(&lookup, ENV_RETRY_ATTEMPTS)? {
            config.retry.max_attempts = u32::try_from(value).map_err(|_| ConfigError {
                key: ENV_RETRY_ATTEMPTS,
                value: value.to_string(),
                expected: "at most 4294967295 attempts",
            })?;
        }
        if let Some(value) = parse_var(&lookup, ENV_RETRY_BACKOFF_MS)? {
            config.retry.backoff_ms = value;
        }
        Ok(config)
    }
}

fn parse_var(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<u64>, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<u64>()
        .map(Some)
        .map_err(|_| ConfigError {
            key,
            value: raw,
            expected: "a non-negative integer",
        })
}
