//! Domain types for the scan engine

pub mod bar;
pub mod ticker;

pub use bar::{Bar, OhlcvSeries};
pub use ticker::{dedup_preserving_order, normalize_tickers, Ticker, TickerError, DEFAULT_SUFFIX};

use std::collections::BTreeMap;

/// Normalized download: ticker → chronologically sorted series.
pub type SeriesMap = BTreeMap<Ticker, OhlcvSeries>;
