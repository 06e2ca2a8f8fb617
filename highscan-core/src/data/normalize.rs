//! Frame normalization: raw download → ticker → sorted series.

use super::provider::RawDownload;
use super::schema::{
    from_millis, FrameError, FrameSchema, COL_CLOSE, COL_HIGH, COL_LOW, COL_OPEN, COL_SYMBOL,
    COL_TIMESTAMP, COL_VOLUME, OHLCV_COLUMNS,
};
use crate::domain::{Bar, OhlcvSeries, SeriesMap, Ticker};
use polars::prelude::*;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Normalizer for raw downloads
pub struct FrameNormalizer;

impl FrameNormalizer {
    /// Resolve the download shape and split it into per-ticker series.
    ///
    /// - `Keyed`: one series per symbol present, empty series dropped.
    /// - `Flat`: attributed to the single requested ticker.
    /// - `Empty`: empty map.
    pub fn normalize(raw: RawDownload, requested: &[Ticker]) -> Result<SeriesMap, FrameError> {
        match raw {
            RawDownload::Empty => Ok(SeriesMap::new()),
            RawDownload::Keyed(df) => Self::split_keyed(&df),
            RawDownload::Flat(df) => match requested {
                [only] => {
                    FrameSchema::validate(&df, false)?;
                    let series = Self::to_series(Self::canonicalize(df.lazy()).collect()?)?;
                    let mut out = SeriesMap::new();
                    if !series.is_empty() {
                        out.insert(only.clone(), series);
                    }
                    Ok(out)
                }
                _ => Err(FrameError::AmbiguousFlatFrame {
                    requested: requested.len(),
                }),
            },
        }
    }

    /// Like [`normalize`](Self::normalize), but a malformed frame is logged
    /// and treated as no data.
    pub fn normalize_or_empty(raw: RawDownload, requested: &[Ticker], label: &str) -> SeriesMap {
        match Self::normalize(raw, requested) {
            Ok(map) => map,
            Err(e) => {
                warn!("{label}: malformed frame skipped: {e}");
                SeriesMap::new()
            }
        }
    }

    fn split_keyed(df: &DataFrame) -> Result<SeriesMap, FrameError> {
        FrameSchema::validate(df, true)?;

        let symbols: BTreeSet<String> = df
            .column(COL_SYMBOL)?
            .str()?
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect();

        let mut out = SeriesMap::new();
        for sym in symbols {
            let ticker = match Ticker::with_suffix(&sym, "") {
                Ok(t) => t,
                Err(e) => {
                    debug!("dropping rows for unusable symbol '{sym}': {e}");
                    continue;
                }
            };

            let sub = Self::canonicalize(
                df.clone()
                    .lazy()
                    .filter(col(COL_SYMBOL).eq(lit(sym.as_str()))),
            )
            .collect()?;

            let series = Self::to_series(sub)?;
            if series.is_empty() {
                debug!("{ticker}: no non-empty rows in download");
                continue;
            }
            out.insert(ticker, series);
        }
        Ok(out)
    }

    /// Cast OHLCV to f64, drop rows with no timestamp or no OHLCV cell,
    /// sort by timestamp (ties keep row order) and keep the first row per
    /// timestamp.
    pub fn canonicalize(lf: LazyFrame) -> LazyFrame {
        let any_present = OHLCV_COLUMNS.iter().fold(lit(false), |acc, name| {
            acc.or(col(*name).is_not_null().and(col(*name).is_not_nan()))
        });

        lf.with_columns(
            OHLCV_COLUMNS
                .iter()
                .map(|name| col(*name).cast(DataType::Float64))
                .collect::<Vec<_>>(),
        )
        .with_column(col(COL_TIMESTAMP).cast(DataType::Int64))
        .filter(col(COL_TIMESTAMP).is_not_null().and(any_present))
        .sort(
            [COL_TIMESTAMP],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .unique_stable(Some(vec![COL_TIMESTAMP.into()]), UniqueKeepStrategy::First)
    }

    /// Convert a canonical frame into a series.
    fn to_series(df: DataFrame) -> Result<OhlcvSeries, FrameError> {
        let ts_col = df.column(COL_TIMESTAMP)?.cast(&DataType::Int64)?;
        let timestamps = ts_col.i64()?;

        let open = f64_values(&df, COL_OPEN)?;
        let high = f64_values(&df, COL_HIGH)?;
        let low = f64_values(&df, COL_LOW)?;
        let close = f64_values(&df, COL_CLOSE)?;
        let volume = f64_values(&df, COL_VOLUME)?;

        let bars = timestamps
            .into_iter()
            .enumerate()
            .filter_map(|(i, ms)| {
                let timestamp = from_millis(ms?)?;
                Some(Bar {
                    timestamp,
                    open: open[i],
                    high: high[i],
                    low: low[i],
                    close: close[i],
                    volume: volume[i],
                })
            })
            .collect();

        Ok(OhlcvSeries::from_bars(bars))
    }
}

/// Column values as f64 with nulls mapped to NaN.
fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<f64>, FrameError> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}
