//! Ticker: canonical, exchange-suffixed symbol.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Default market suffix appended to bare symbols (NSE on Yahoo Finance).
pub const DEFAULT_SUFFIX: &str = ".NS";

/// Prefix Yahoo uses for index symbols (e.g. `^NSEI`).
pub const INDEX_PREFIX: char = '^';

/// A normalized ticker.
///
/// Canonical form is trimmed, upper-cased and carries a market suffix,
/// unless the raw symbol already has one (`BRK-B.BO`) or is an index
/// marker (`^NSEI`). Identity and ordering are by the canonical string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticker(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TickerError {
    #[error("empty ticker")]
    Empty,

    #[error("ticker '{0}' contains whitespace")]
    Whitespace(String),
}

impl Ticker {
    /// Normalize a raw symbol using the default `.NS` suffix.
    pub fn parse(raw: &str) -> Result<Self, TickerError> {
        Self::with_suffix(raw, DEFAULT_SUFFIX)
    }

    /// Normalize a raw symbol, appending `suffix` when the symbol has none.
    pub fn with_suffix(raw: &str, suffix: &str) -> Result<Self, TickerError> {
        let sym = raw.trim().to_uppercase();
        if sym.is_empty() {
            return Err(TickerError::Empty);
        }
        if sym.chars().any(char::is_whitespace) {
            return Err(TickerError::Whitespace(sym));
        }

        if sym.starts_with(INDEX_PREFIX) || has_market_suffix(&sym) {
            Ok(Self(sym))
        } else {
            Ok(Self(format!("{sym}{}", suffix.to_uppercase())))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for index markers such as `^NSEI`.
    pub fn is_index(&self) -> bool {
        self.0.starts_with(INDEX_PREFIX)
    }
}

/// A suffix is a trailing `.XX` segment of 1-3 letters (`.NS`, `.BO`, `.L`).
fn has_market_suffix(sym: &str) -> bool {
    match sym.rsplit_once('.') {
        Some((head, tail)) => {
            !head.is_empty()
                && (1..=3).contains(&tail.len())
                && tail.chars().all(|c| c.is_ascii_alphabetic())
        }
        None => false,
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalize, deduplicate and sort a collection of raw symbols.
///
/// Blank or malformed entries are dropped.
pub fn normalize_tickers<I, S>(raw: I, suffix: &str) -> Vec<Ticker>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .filter_map(|s| Ticker::with_suffix(s.as_ref(), suffix).ok())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Deduplicate while keeping first-seen order.
pub fn dedup_preserving_order(tickers: &[Ticker]) -> Vec<Ticker> {
    let mut seen = BTreeSet::new();
    tickers
        .iter()
        .filter(|t| seen.insert((*t).clone()))
        .cloned()
        .collect()
}
