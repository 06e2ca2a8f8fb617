//! Breakout beacon: today's daily bar takes out the high or low of the
//! prior N sessions.

use super::{DedupSet, Direction, SkipReason, NO_TIMESTAMP};
use crate::domain::{Bar, OhlcvSeries, SeriesMap, Ticker};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

pub const DEFAULT_LOOKBACKS: [usize; 4] = [50, 100, 200, 365];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakoutSignal {
    pub ticker: Ticker,
    pub lookback: usize,
    pub direction: Direction,
    /// Close relative to the broken level, in percent.
    pub signal_pct: f64,
    /// Today's open-to-close move, in percent.
    pub move_pct: f64,
    /// Latest intraday bar of the ticker, when one was downloaded.
    pub timestamp: Option<NaiveDateTime>,
}

impl BreakoutSignal {
    /// `HH:MM` of the intraday timestamp, or the no-timestamp marker.
    pub fn time_label(&self) -> String {
        self.timestamp
            .map(|ts| ts.format("%H:%M").to_string())
            .unwrap_or_else(|| NO_TIMESTAMP.to_string())
    }
}

impl fmt::Display for BreakoutSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<12} | {:>4} | sig={:5.2}% | move={:5.2}% | @ {}",
            self.ticker.as_str(),
            self.direction,
            self.signal_pct,
            self.move_pct,
            self.time_label()
        )
    }
}

/// Result of classifying one ticker for one lookback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub direction: Direction,
    pub signal_pct: f64,
    pub move_pct: f64,
}

/// Classify the last clean daily bar against the `lookback` bars before it.
///
/// Bars missing any of Open/High/Low/Close are dropped first; `lookback + 1`
/// clean bars are needed. High is checked before low, so a bar that breaks
/// both ways is a bull.
pub fn classify(series: &OhlcvSeries, lookback: usize) -> Result<Option<Classification>, SkipReason> {
    let clean = series.clean_by(Bar::has_prices);
    let need = lookback + 1;
    if clean.len() < need || lookback == 0 {
        return Err(SkipReason::InsufficientHistory {
            have: clean.len(),
            need,
        });
    }

    let window = &clean[clean.len() - need..];
    let (today, prior) = match window.split_last() {
        Some(split) => split,
        None => return Err(SkipReason::InsufficientHistory { have: 0, need }),
    };

    let prior_high = prior.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    let prior_low = prior.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);

    let (direction, level) = if today.high > prior_high {
        (Direction::Bull, prior_high)
    } else if today.low < prior_low {
        (Direction::Bear, prior_low)
    } else {
        return Ok(None);
    };

    let signal_pct = (today.close - level) / level * 100.0;
    let move_pct = (today.close - today.open) / today.open * 100.0;
    if !signal_pct.is_finite() || !move_pct.is_finite() {
        return Err(SkipReason::DegeneratePrice);
    }

    Ok(Some(Classification {
        direction,
        signal_pct,
        move_pct,
    }))
}

/// Breakout detector over a fixed set of lookbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakoutDetector {
    lookbacks: Vec<usize>,
}

impl Default for BreakoutDetector {
    fn default() -> Self {
        Self::new(&DEFAULT_LOOKBACKS)
    }
}

impl BreakoutDetector {
    /// Lookbacks are sorted and deduplicated; zero is dropped.
    pub fn new(lookbacks: &[usize]) -> Self {
        let mut lookbacks: Vec<usize> = lookbacks.iter().copied().filter(|&n| n > 0).collect();
        lookbacks.sort_unstable();
        lookbacks.dedup();
        Self { lookbacks }
    }

    pub fn lookbacks(&self) -> &[usize] {
        &self.lookbacks
    }

    /// Daily sessions a download must cover for the longest lookback.
    pub fn required_sessions(&self) -> usize {
        self.lookbacks.last().map_or(1, |n| n + 1)
    }

    /// Run one lookback over `tickers` in order.
    ///
    /// Tickers in `seen` are skipped; tickers that fire are added to it.
    /// `intraday` only supplies the timestamp attached to a signal.
    pub fn detect_period(
        &self,
        lookback: usize,
        tickers: &[Ticker],
        daily: &SeriesMap,
        intraday: &SeriesMap,
        seen: &mut DedupSet,
    ) -> Vec<BreakoutSignal> {
        let mut out = Vec::new();
        for ticker in tickers {
            if seen.contains(ticker) {
                continue;
            }
            let Some(series) = daily.get(ticker) else {
                continue;
            };

            match classify(series, lookback) {
                Ok(Some(c)) => {
                    seen.insert(ticker.clone());
                    out.push(BreakoutSignal {
                        ticker: ticker.clone(),
                        lookback,
                        direction: c.direction,
                        signal_pct: c.signal_pct,
                        move_pct: c.move_pct,
                        timestamp: intraday.get(ticker).and_then(|s| s.last()).map(|b| b.timestamp),
                    });
                }
                Ok(None) => {}
                Err(reason) => debug!("{ticker}: {lookback}-day breakout skipped: {reason}"),
            }
        }
        out
    }
}
