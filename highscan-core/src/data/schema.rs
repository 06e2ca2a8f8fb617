//! Column layout of raw download frames.
//!
//! Timestamps are epoch milliseconds of the exchange-local wall clock,
//! stored as Int64 (a Datetime column is accepted too). Keyed frames add a
//! `symbol` column; OHLCV cells may be null.

use super::provider::RawBar;
use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;
use thiserror::Error;

pub const COL_TIMESTAMP: &str = "timestamp";
pub const COL_SYMBOL: &str = "symbol";
pub const COL_OPEN: &str = "open";
pub const COL_HIGH: &str = "high";
pub const COL_LOW: &str = "low";
pub const COL_CLOSE: &str = "close";
pub const COL_VOLUME: &str = "volume";

pub const OHLCV_COLUMNS: [&str; 5] = [COL_OPEN, COL_HIGH, COL_LOW, COL_CLOSE, COL_VOLUME];

/// A frame that can't be turned into series.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("type mismatch in column {column}: expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: String,
    },

    #[error("flat frame cannot be attributed: {requested} tickers requested")]
    AmbiguousFlatFrame { requested: usize },

    #[error("polars: {0}")]
    Polars(#[from] PolarsError),
}

/// Expected layout for raw frames.
pub struct FrameSchema;

impl FrameSchema {
    /// Check that `df` has the columns a flat (`keyed = false`) or keyed
    /// frame needs, with usable types.
    pub fn validate(df: &DataFrame, keyed: bool) -> Result<(), FrameError> {
        let schema = df.schema();

        let ts = column_type(&schema, COL_TIMESTAMP)?;
        if !matches!(ts, DataType::Int64 | DataType::Datetime(_, _)) {
            return Err(mismatch(COL_TIMESTAMP, "Int64 or Datetime", ts));
        }

        if keyed {
            let sym = column_type(&schema, COL_SYMBOL)?;
            if !matches!(sym, DataType::String) {
                return Err(mismatch(COL_SYMBOL, "String", sym));
            }
        }

        for name in OHLCV_COLUMNS {
            let dt = column_type(&schema, name)?;
            if !is_numeric(dt) {
                return Err(mismatch(name, "numeric", dt));
            }
        }

        Ok(())
    }
}

fn column_type<'a>(schema: &'a Schema, name: &str) -> Result<&'a DataType, FrameError> {
    schema
        .get(name)
        .ok_or_else(|| FrameError::MissingColumn(name.to_string()))
}

fn is_numeric(dt: &DataType) -> bool {
    matches!(
        dt,
        DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::UInt64
            | DataType::UInt32
            | DataType::Null
    )
}

fn mismatch(column: &str, expected: &'static str, actual: &DataType) -> FrameError {
    FrameError::TypeMismatch {
        column: column.to_string(),
        expected,
        actual: format!("{actual:?}"),
    }
}

pub fn to_millis(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_millis()
}

pub fn from_millis(ms: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc())
}

/// Build a raw frame from provider rows. `symbol = Some(..)` makes it keyed.
pub fn frame_from_rows(symbol: Option<&str>, rows: &[RawBar]) -> PolarsResult<DataFrame> {
    let mut columns = Vec::with_capacity(7);
    columns.push(Column::new(
        COL_TIMESTAMP.into(),
        rows.iter().map(|r| to_millis(r.timestamp)).collect::<Vec<i64>>(),
    ));
    if let Some(sym) = symbol {
        columns.push(Column::new(COL_SYMBOL.into(), vec![sym; rows.len()]));
    }

    let field = |get: fn(&RawBar) -> Option<f64>| rows.iter().map(get).collect::<Vec<Option<f64>>>();
    columns.push(Column::new(COL_OPEN.into(), field(|r| r.open)));
    columns.push(Column::new(COL_HIGH.into(), field(|r| r.high)));
    columns.push(Column::new(COL_LOW.into(), field(|r| r.low)));
    columns.push(Column::new(COL_CLOSE.into(), field(|r| r.close)));
    columns.push(Column::new(COL_VOLUME.into(), field(|r| r.volume)));

    DataFrame::new(columns)
}
