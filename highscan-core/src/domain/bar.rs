//! Bar and series: the market data units detectors work on.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// OHLCV bar at a single timestamp (exchange-local time).
///
/// Missing cells are NaN, mirroring what the provider hands back for
/// halted or partially reported intervals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// True when every OHLCV cell is missing.
    pub fn is_empty(&self) -> bool {
        self.open.is_nan()
            && self.high.is_nan()
            && self.low.is_nan()
            && self.close.is_nan()
            && self.volume.is_nan()
    }

    /// True when open, high, low and close are all present.
    pub fn has_prices(&self) -> bool {
        !(self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan())
    }

    /// True when every OHLCV cell is present.
    pub fn is_complete(&self) -> bool {
        self.has_prices() && !self.volume.is_nan()
    }
}

/// Chronologically ordered bars for one ticker.
///
/// Built by the frame normalizer, which guarantees non-decreasing
/// timestamps, one bar per timestamp and no fully-empty bars.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OhlcvSeries {
    bars: Vec<Bar>,
}

impl OhlcvSeries {
    /// Build a series, sorting (stable) by timestamp, keeping the first
    /// bar per timestamp and dropping fully-empty bars. A negative volume
    /// is treated as missing.
    pub fn from_bars(mut bars: Vec<Bar>) -> Self {
        for bar in bars.iter_mut().filter(|b| b.volume < 0.0) {
            bar.volume = f64::NAN;
        }
        bars.retain(|b| !b.is_empty());
        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by_key(|b| b.timestamp);
        Self { bars }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first(&self) -> Option<&Bar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Bars that pass `keep`, in order.
    pub fn clean_by(&self, keep: impl Fn(&Bar) -> bool) -> Vec<Bar> {
        self.bars.iter().copied().filter(|b| keep(b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(9, 15 + minute, 0)
            .unwrap()
    }

    fn bar(minute: u32, close: f64) -> Bar {
        Bar {
            timestamp: ts(minute),
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 1_000.0,
        }
    }

    fn empty_bar(minute: u32) -> Bar {
        Bar {
            timestamp: ts(minute),
            open: f64::NAN,
            high: f64::NAN,
            low: f64::NAN,
            close: f64::NAN,
            volume: f64::NAN,
        }
    }

    #[test]
    fn from_bars_sorts_and_drops_empty() {
        let s = OhlcvSeries::from_bars(vec![bar(10, 3.0), empty_bar(5), bar(0, 1.0)]);
        assert_eq!(s.len(), 2);
        assert_eq!(s.first().unwrap().close, 1.0);
        assert_eq!(s.last().unwrap().close, 3.0);
    }

    #[test]
    fn from_bars_keeps_first_per_timestamp() {
        let s = OhlcvSeries::from_bars(vec![bar(5, 10.0), bar(0, 1.0), bar(5, 20.0)]);
        assert_eq!(s.len(), 2);
        assert_eq!(s.last().unwrap().close, 10.0);
    }

    #[test]
    fn partial_bar_is_not_empty_but_incomplete() {
        let mut b = bar(0, 5.0);
        b.volume = f64::NAN;
        assert!(!b.is_empty());
        assert!(b.has_prices());
        assert!(!b.is_complete());
    }

    #[test]
    fn negative_volume_is_missing() {
        let mut b = bar(0, 5.0);
        b.volume = -300.0;
        let s = OhlcvSeries::from_bars(vec![b]);
        let kept = s.first().unwrap();
        assert!(kept.volume.is_nan());
        assert!(kept.has_prices());
        assert!(!kept.is_complete());
    }
}
