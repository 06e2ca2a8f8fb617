//! Market-data provider trait, request shapes and structured error types.
//!
//! The MarketDataProvider trait abstracts over data sources (Yahoo Finance,
//! in-memory fixtures) so the downloader and scanner can be exercised
//! without the network.

use crate::domain::Ticker;
use chrono::NaiveDateTime;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Raw OHLCV row from a provider, before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    pub timestamp: NaiveDateTime,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

/// Longest daily history any request asks for, in sessions.
pub const MAX_HISTORY_SESSIONS: usize = 10_000;

/// How much history to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    /// The current (or most recent) trading session.
    Session,
    /// The last `n` trading sessions.
    Sessions(usize),
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session => f.write_str("1d"),
            Self::Sessions(n) => write!(f, "{n}d"),
        }
    }
}

/// Bar interval accepted by the chart API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Interval(String);

/// Intervals the Yahoo chart endpoint understands.
pub const VALID_INTERVALS: &[&str] = &[
    "1m", "2m", "5m", "15m", "30m", "60m", "90m", "1h", "1d", "5d", "1wk", "1mo", "3mo",
];

impl Interval {
    pub fn daily() -> Self {
        Self("1d".into())
    }

    /// Five-minute bars.
    pub fn five_minute() -> Self {
        Self("5m".into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for sub-daily intervals.
    pub fn is_intraday(&self) -> bool {
        self.0.ends_with('m') || self.0.ends_with('h')
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if VALID_INTERVALS.contains(&s) {
            Ok(Self(s.to_string()))
        } else {
            Err(format!(
                "unsupported interval '{s}' (valid: {})",
                VALID_INTERVALS.join(", ")
            ))
        }
    }
}

impl TryFrom<String> for Interval {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.0
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Column grouping of a multi-ticker response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupBy {
    /// Always key rows by ticker, even for a single ticker.
    Ticker,
    /// Key rows by ticker only when more than one ticker is requested.
    Column,
}

/// One batch download.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub tickers: Vec<Ticker>,
    pub period: Period,
    pub interval: Interval,
    pub group_by: GroupBy,
}

/// The shapes a batch download can come back in.
///
/// Resolved once by the normalizer; nothing downstream branches on shape.
#[derive(Debug, Clone)]
pub enum RawDownload {
    /// Nothing came back.
    Empty,
    /// A single table with no ticker key.
    Flat(DataFrame),
    /// Long table keyed by a `symbol` column.
    Keyed(DataFrame),
}

impl RawDownload {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Flat(df) | Self::Keyed(df) => df.height() == 0,
        }
    }
}

/// Structured error types for fetch operations.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("HTTP {status} for {symbol}")]
    Http { status: u16, symbol: String },

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("provider returned no data")]
    EmptyResponse,

    #[error("{label}: gave up after {attempts} attempt(s): {last}")]
    Exhausted {
        label: String,
        attempts: u32,
        last: Box<FetchError>,
    },
}

/// Trait for market-data providers.
///
/// Implementations fetch a batch of tickers and hand back the raw shape;
/// retry, failure accounting and normalization live above this trait.
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch bars for every ticker in the request.
    fn download(&self, request: &DownloadRequest) -> Result<RawDownload, FetchError>;
}
