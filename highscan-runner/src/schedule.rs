//! Fixed-cadence scheduling of scan passes.
//!
//! Passes never overlap: the next one starts `cadence` after the previous
//! one started, or immediately if the previous pass overran.

use crate::report::ScanReporter;
use crate::scanner::{ScanReport, Scanner};
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    cadence: Duration,
}

impl Schedule {
    pub fn new(cadence: Duration) -> Self {
        Self { cadence }
    }

    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    /// Wait before the next pass, given how long the last one took.
    pub fn next_delay(&self, elapsed: Duration) -> Duration {
        self.cadence.saturating_sub(elapsed)
    }
}

/// Run a pass now, then one per cadence.
///
/// Runs forever when `cycles` is `None`; otherwise stops after that many
/// passes. `on_pass` sees every report.
pub fn run_schedule(
    scanner: &mut Scanner,
    schedule: &Schedule,
    reporter: &dyn ScanReporter,
    cycles: Option<u64>,
    mut on_pass: impl FnMut(&ScanReport),
) -> u64 {
    info!(
        "scheduled full scan every {}s",
        schedule.cadence().as_secs_f64()
    );

    let mut passes = 0u64;
    loop {
        let started = Instant::now();
        let report = scanner.scan_once(reporter);
        passes += 1;
        on_pass(&report);

        if cycles.is_some_and(|limit| passes >= limit) {
            return passes;
        }

        let elapsed = started.elapsed();
        let delay = schedule.next_delay(elapsed);
        if delay.is_zero() {
            warn!(
                "scan pass took {:.1}s, longer than the {}s cadence; starting the next one now",
                elapsed.as_secs_f64(),
                schedule.cadence().as_secs()
            );
        }
        std::thread::sleep(delay);
    }
}
