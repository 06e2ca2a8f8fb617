//! highscan runner: scan orchestration on top of `highscan-core`.
//!
//! This crate provides:
//! - `ScanConfig` loaded from TOML with validation
//! - The `ScanReporter` presentation sink (stdout and in-memory)
//! - `Scanner`, owning the failure ledger and dedup state across passes
//! - Fixed-cadence scheduling of passes

pub mod config;
pub mod report;
pub mod scanner;
pub mod schedule;

pub use config::{ConfigError, ScanConfig};
pub use report::{CollectingReporter, ScanReporter, StdoutReporter};
pub use scanner::{ScanReport, Scanner, SCREEN_LOOKBACK_SESSIONS};
pub use schedule::{run_schedule, Schedule};
