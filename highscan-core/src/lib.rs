//! highscan core: market-data acquisition and signal detection.
//!
//! This crate contains the scan engine:
//! - Domain types (tickers, bars, per-ticker series)
//! - Market-data provider trait and the Yahoo chart provider
//! - Retrying batch downloader with the failure ledger and skip set
//! - Frame normalizer resolving flat and ticker-keyed downloads
//! - Universe loading (TOML or NSE index constituent lists)
//! - Fresh-high, intraday-boost and breakout detectors with dedup state

pub mod data;
pub mod domain;
pub mod signals;
