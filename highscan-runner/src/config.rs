//! Scan configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration. `validate()` runs after loading and names the first bad
//! field.

use highscan_core::data::{Interval, RetryPolicy, MAX_HISTORY_SESSIONS};
use highscan_core::domain::{Ticker, TickerError, DEFAULT_SUFFIX};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {field} {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("invalid benchmark ticker: {0}")]
    Benchmark(#[from] TickerError),
}

/// Largest accepted backoff unit, seconds.
pub const MAX_BACKOFF_BASE_SECS: f64 = 3600.0;

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Configuration for the scan loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// Minimum last/first volume ratio for an intraday boost.
    pub volume_threshold: f64,
    /// Intraday bar interval.
    pub interval: Interval,
    /// Breakout lookbacks, in daily sessions.
    pub breakout_lookbacks: Vec<usize>,
    /// Per-request HTTP timeout, seconds.
    pub request_timeout_secs: u64,
    /// Download attempts per batch.
    pub retries: u32,
    /// Exhausted downloads before a ticker is skipped for the run.
    pub max_failures: u32,
    /// Tickers per download request.
    pub batch_size: usize,
    /// Seconds between the starts of two passes.
    pub cadence_secs: u64,
    /// Backoff unit, seconds; attempt `n` failing waits `n` units.
    pub backoff_base_secs: f64,
    /// Prior sessions for the 52-week-high check.
    pub fresh_high_window: usize,
    /// Relative tolerance for the 52-week-high check.
    pub fresh_high_tolerance: f64,
    /// Benchmark index for relative strength.
    pub benchmark: String,
    /// Market suffix appended to bare symbols.
    pub market_suffix: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            volume_threshold: 2.5,
            interval: Interval::five_minute(),
            breakout_lookbacks: vec![50, 100, 200, 365],
            request_timeout_secs: 20,
            retries: 3,
            max_failures: 3,
            batch_size: 500,
            cadence_secs: 300,
            backoff_base_secs: 2.0,
            fresh_high_window: 252,
            fresh_high_tolerance: 1e-6,
            benchmark: "^NSEI".into(),
            market_suffix: DEFAULT_SUFFIX.into(),
        }
    }
}

impl ScanConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.volume_threshold.is_finite() && self.volume_threshold > 0.0) {
            return Err(invalid("volume_threshold", "must be a positive number"));
        }
        if !self.interval.is_intraday() {
            return Err(invalid("interval", format!("'{}' is not intraday", self.interval)));
        }
        if self.breakout_lookbacks.is_empty() {
            return Err(invalid("breakout_lookbacks", "must not be empty"));
        }
        if self.breakout_lookbacks.contains(&0) {
            return Err(invalid("breakout_lookbacks", "must be positive"));
        }
        if self.breakout_lookbacks.iter().any(|&n| n >= MAX_HISTORY_SESSIONS) {
            return Err(invalid(
                "breakout_lookbacks",
                format!("must be below {MAX_HISTORY_SESSIONS} sessions"),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs", "must be positive"));
        }
        if self.retries == 0 {
            return Err(invalid("retries", "must be positive"));
        }
        if self.max_failures == 0 {
            return Err(invalid("max_failures", "must be positive"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be positive"));
        }
        if self.cadence_secs == 0 {
            return Err(invalid("cadence_secs", "must be positive"));
        }
        if !(0.0..=MAX_BACKOFF_BASE_SECS).contains(&self.backoff_base_secs) {
            return Err(invalid(
                "backoff_base_secs",
                format!("must be in [0, {MAX_BACKOFF_BASE_SECS}]"),
            ));
        }
        if self.fresh_high_window == 0 {
            return Err(invalid("fresh_high_window", "must be positive"));
        }
        if self.fresh_high_window >= MAX_HISTORY_SESSIONS {
            return Err(invalid(
                "fresh_high_window",
                format!("must be below {MAX_HISTORY_SESSIONS} sessions"),
            ));
        }
        if !(self.fresh_high_tolerance.is_finite() && (0.0..1.0).contains(&self.fresh_high_tolerance)) {
            return Err(invalid("fresh_high_tolerance", "must be in [0, 1)"));
        }
        self.benchmark_ticker()?;
        Ok(())
    }

    pub fn benchmark_ticker(&self) -> Result<Ticker, ConfigError> {
        Ok(Ticker::with_suffix(&self.benchmark, &self.market_suffix)?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cadence(&self) -> Duration {
        Duration::from_secs(self.cadence_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retries,
            backoff_base: Duration::try_from_secs_f64(
                self.backoff_base_secs.clamp(0.0, MAX_BACKOFF_BASE_SECS),
            )
            .unwrap_or_default(),
            batch_size: self.batch_size,
        }
    }
}
