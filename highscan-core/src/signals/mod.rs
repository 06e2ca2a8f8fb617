//! Signal detection: fresh 52-week highs, intraday volume boosts and
//! N-session breakouts.
//!
//! Detectors are pure functions over normalized series. The two that must
//! not fire twice take a [`DedupSet`] and add to it on emission; the
//! 52-week detector keeps no state at all. Signal records are immutable
//! once emitted.

pub mod breakout;
pub mod dedup;
pub mod fresh_high;
pub mod intraday_boost;

pub use breakout::{BreakoutDetector, BreakoutSignal};
pub use dedup::{DedupSet, DedupState};
pub use fresh_high::{FreshHighDetector, FreshHighSignal};
pub use intraday_boost::{benchmark_move, IntradayBoostDetector, IntradayBoostSignal};

use crate::domain::Ticker;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shown in place of a breakout's intraday timestamp when none is known.
pub const NO_TIMESTAMP: &str = "--:--";

/// Breakout direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bull,
    Bear,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Bull => "bull",
            Self::Bear => "bear",
        })
    }
}

/// Why a ticker was left out of a detector's output this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Fewer clean bars than the detector needs.
    InsufficientHistory { have: usize, need: usize },
    /// A reference price is zero or non-finite.
    DegeneratePrice,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientHistory { have, need } => {
                write!(f, "insufficient history ({have} of {need} bars)")
            }
            Self::DegeneratePrice => f.write_str("degenerate reference price"),
        }
    }
}

/// Detector that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    FreshHigh,
    IntradayBoost,
    Breakout,
}

/// An emitted signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalRecord {
    FreshHigh(FreshHighSignal),
    IntradayBoost(IntradayBoostSignal),
    Breakout(BreakoutSignal),
}

impl SignalRecord {
    pub fn kind(&self) -> SignalKind {
        match self {
            Self::FreshHigh(_) => SignalKind::FreshHigh,
            Self::IntradayBoost(_) => SignalKind::IntradayBoost,
            Self::Breakout(_) => SignalKind::Breakout,
        }
    }

    pub fn ticker(&self) -> &Ticker {
        match self {
            Self::FreshHigh(s) => &s.ticker,
            Self::IntradayBoost(s) => &s.ticker,
            Self::Breakout(s) => &s.ticker,
        }
    }
}

impl fmt::Display for SignalRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FreshHigh(s) => s.fmt(f),
            Self::IntradayBoost(s) => s.fmt(f),
            Self::Breakout(s) => s.fmt(f),
        }
    }
}

impl From<FreshHighSignal> for SignalRecord {
    fn from(s: FreshHighSignal) -> Self {
        Self::FreshHigh(s)
    }
}

impl From<IntradayBoostSignal> for SignalRecord {
    fn from(s: IntradayBoostSignal) -> Self {
        Self::IntradayBoost(s)
    }
}

impl From<BreakoutSignal> for SignalRecord {
    fn from(s: BreakoutSignal) -> Self {
        Self::Breakout(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_pads_like_a_str() {
        assert_eq!(format!("{:>5}", Direction::Bull), " bull");
        assert_eq!(Direction::Bear.to_string(), "bear");
    }

    #[test]
    fn record_kind_and_ticker() {
        let ticker = Ticker::parse("TCS").unwrap();
        let rec: SignalRecord = IntradayBoostSignal {
            ticker: ticker.clone(),
            spike: 3.0,
            move_pct: 3.0,
            r_factor: 6.0,
        }
        .into();
        assert_eq!(rec.kind(), SignalKind::IntradayBoost);
        assert_eq!(rec.ticker(), &ticker);
    }

    #[test]
    fn skip_reason_message() {
        let r = SkipReason::InsufficientHistory { have: 1, need: 2 };
        assert_eq!(r.to_string(), "insufficient history (1 of 2 bars)");
    }
}
