//! Intraday boost: session volume spike with the ticker's move measured
//! against the benchmark's.

use super::{DedupSet, SkipReason};
use crate::domain::{Bar, OhlcvSeries, SeriesMap, Ticker};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

pub const DEFAULT_VOLUME_THRESHOLD: f64 = 2.5;

/// Smallest benchmark move used as an R-factor denominator.
pub const BENCHMARK_MOVE_FLOOR: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntradayBoostSignal {
    pub ticker: Ticker,
    /// Last bar volume over first bar volume.
    pub spike: f64,
    /// Session move in percent.
    pub move_pct: f64,
    /// Session move relative to the benchmark's.
    pub r_factor: f64,
}

impl fmt::Display for IntradayBoostSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<12} | spike={:4.2}x | move={:5.2}% | R={:4.2}",
            self.ticker.as_str(),
            self.spike,
            self.move_pct,
            self.r_factor
        )
    }
}

/// Complete bars of a session, or the reason there aren't enough.
fn session_bars(series: &OhlcvSeries) -> Result<Vec<Bar>, SkipReason> {
    let clean = series.clean_by(Bar::is_complete);
    if clean.len() < 2 {
        return Err(SkipReason::InsufficientHistory {
            have: clean.len(),
            need: 2,
        });
    }
    Ok(clean)
}

/// First open to last close, as a fraction.
fn session_move(bars: &[Bar]) -> Result<f64, SkipReason> {
    let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
        return Err(SkipReason::InsufficientHistory { have: 0, need: 2 });
    };
    let m = (last.close - first.open) / first.open;
    if m.is_finite() {
        Ok(m)
    } else {
        Err(SkipReason::DegeneratePrice)
    }
}

/// Keep `m` away from zero, preserving its sign (zero becomes the positive
/// floor).
pub fn clamp_move(m: f64) -> f64 {
    if m.abs() >= BENCHMARK_MOVE_FLOOR {
        m
    } else if m < 0.0 {
        -BENCHMARK_MOVE_FLOOR
    } else {
        BENCHMARK_MOVE_FLOOR
    }
}

/// Session move of the benchmark, clamped away from zero.
pub fn benchmark_move(series: &OhlcvSeries) -> Result<f64, SkipReason> {
    session_bars(series)
        .and_then(|bars| session_move(&bars))
        .map(clamp_move)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntradayBoostDetector {
    /// Minimum volume spike.
    pub threshold: f64,
}

impl Default for IntradayBoostDetector {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_VOLUME_THRESHOLD,
        }
    }
}

impl IntradayBoostDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Evaluate one ticker's session against an already clamped benchmark
    /// move. Does not consult or touch any dedup set.
    pub fn evaluate(
        &self,
        ticker: &Ticker,
        series: &OhlcvSeries,
        benchmark_move: f64,
    ) -> Result<Option<IntradayBoostSignal>, SkipReason> {
        let bars = session_bars(series)?;
        let (first, last) = (bars[0], bars[bars.len() - 1]);

        let spike = last.volume / first.volume.max(1.0);
        if spike < self.threshold {
            return Ok(None);
        }

        let stock_move = session_move(&bars)?;
        Ok(Some(IntradayBoostSignal {
            ticker: ticker.clone(),
            spike,
            move_pct: stock_move * 100.0,
            r_factor: stock_move / clamp_move(benchmark_move),
        }))
    }

    /// Run over `tickers` in order, skipping and then extending `seen`.
    pub fn detect(
        &self,
        tickers: &[Ticker],
        intraday: &SeriesMap,
        benchmark_move: f64,
        seen: &mut DedupSet,
    ) -> Vec<IntradayBoostSignal> {
        let mut out = Vec::new();
        for ticker in tickers {
            if seen.contains(ticker) {
                continue;
            }
            let Some(series) = intraday.get(ticker) else {
                continue;
            };
            match self.evaluate(ticker, series, benchmark_move) {
                Ok(Some(signal)) => {
                    seen.insert(ticker.clone());
                    out.push(signal);
                }
                Ok(None) => {}
                Err(reason) => debug!("{ticker}: intraday boost skipped: {reason}"),
            }
        }
        out
    }
}
