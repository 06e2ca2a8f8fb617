//! Fresh 52-week high: today's high clears the prior trailing-window high
//! and the close holds above it.

use super::SkipReason;
use crate::domain::{OhlcvSeries, SeriesMap, Ticker};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Trading sessions in a year.
pub const FIFTY_TWO_WEEK_WINDOW: usize = 252;
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// A ticker printing a fresh high on its latest bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreshHighSignal {
    pub ticker: Ticker,
    pub prior_high: f64,
    pub high: f64,
    pub close: f64,
    pub timestamp: NaiveDateTime,
}

impl fmt::Display for FreshHighSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<12} | high={:.2} | close={:.2} | prior={:.2} | {}",
            self.ticker.as_str(),
            self.high,
            self.close,
            self.prior_high,
            self.timestamp.format("%Y-%m-%d")
        )
    }
}

/// Stateless 52-week-high detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreshHighDetector {
    /// Prior sessions compared against (the latest bar is not part of it).
    pub window: usize,
    /// Relative slack absorbing float noise around the prior high.
    pub tolerance: f64,
}

impl Default for FreshHighDetector {
    fn default() -> Self {
        Self {
            window: FIFTY_TWO_WEEK_WINDOW,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl FreshHighDetector {
    pub fn new(window: usize, tolerance: f64) -> Self {
        Self {
            window: window.max(1),
            tolerance,
        }
    }

    /// Evaluate one series.
    ///
    /// Bars missing High or Close are dropped first; at least two clean
    /// bars are needed.
    pub fn evaluate(
        &self,
        ticker: &Ticker,
        series: &OhlcvSeries,
    ) -> Result<Option<FreshHighSignal>, SkipReason> {
        let clean = series.clean_by(|b| !b.high.is_nan() && !b.close.is_nan());
        let Some((latest, history)) = clean.split_last().filter(|(_, h)| !h.is_empty()) else {
            return Err(SkipReason::InsufficientHistory {
                have: clean.len(),
                need: 2,
            });
        };

        let start = history.len().saturating_sub(self.window);
        let prior_high = history[start..]
            .iter()
            .map(|b| b.high)
            .fold(f64::NEG_INFINITY, f64::max);

        let fresh = latest.high > prior_high * (1.0 + self.tolerance)
            && latest.close >= prior_high * (1.0 - self.tolerance);

        Ok(fresh.then(|| FreshHighSignal {
            ticker: ticker.clone(),
            prior_high,
            high: latest.high,
            close: latest.close,
            timestamp: latest.timestamp,
        }))
    }

    /// Every fresh high in `data`, ordered by ticker.
    pub fn detect(&self, data: &SeriesMap) -> Vec<FreshHighSignal> {
        data.iter()
            .filter_map(|(ticker, series)| match self.evaluate(ticker, series) {
                Ok(signal) => signal,
                Err(reason) => {
                    debug!("{ticker}: fresh-high skipped: {reason}");
                    None
                }
            })
            .collect()
    }

    /// Sorted, deduplicated tickers printing a fresh high.
    pub fn fresh_tickers(&self, data: &SeriesMap) -> Vec<Ticker> {
        self.detect(data).into_iter().map(|s| s.ticker).collect()
    }
}
