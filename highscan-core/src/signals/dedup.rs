//! Process-lifetime memory of tickers already reported.

use crate::domain::Ticker;
use std::collections::{BTreeMap, BTreeSet};

/// Tickers already reported by one detector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupSet(BTreeSet<Ticker>);

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, ticker: &Ticker) -> bool {
        self.0.contains(ticker)
    }

    /// Returns false if the ticker was already present.
    pub fn insert(&mut self, ticker: Ticker) -> bool {
        self.0.insert(ticker)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ticker> {
        self.0.iter()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// Dedup sets for the intraday detector and each breakout lookback.
#[derive(Debug, Clone, Default)]
pub struct DedupState {
    intraday: DedupSet,
    breakout: BTreeMap<usize, DedupSet>,
}

impl DedupState {
    pub fn new(lookbacks: &[usize]) -> Self {
        Self {
            intraday: DedupSet::new(),
            breakout: lookbacks.iter().map(|&n| (n, DedupSet::new())).collect(),
        }
    }

    pub fn intraday(&self) -> &DedupSet {
        &self.intraday
    }

    pub fn intraday_mut(&mut self) -> &mut DedupSet {
        &mut self.intraday
    }

    pub fn breakout(&self, lookback: usize) -> Option<&DedupSet> {
        self.breakout.get(&lookback)
    }

    /// The set for `lookback`, created empty on first use.
    pub fn breakout_mut(&mut self, lookback: usize) -> &mut DedupSet {
        self.breakout.entry(lookback).or_default()
    }

    /// Forget every reported ticker. The scanner never does this on its own.
    pub fn clear(&mut self) {
        self.intraday.clear();
        self.breakout.values_mut().for_each(DedupSet::clear);
    }
}
