//! Presentation sink for scan passes.

use highscan_core::signals::SignalRecord;
use std::sync::Mutex;

/// Receives status lines and emitted signals.
///
/// Fire-and-forget: the scanner never reads anything back.
pub trait ScanReporter: Send + Sync {
    /// A free-form status line (section headers, "no data" notices).
    fn report(&self, line: &str);

    /// An emitted signal.
    fn signal(&self, record: &SignalRecord);
}

/// Prints everything to stdout.
pub struct StdoutReporter;

impl ScanReporter for StdoutReporter {
    fn report(&self, line: &str) {
        println!("{line}");
    }

    fn signal(&self, record: &SignalRecord) {
        println!("  {record}");
    }
}

/// Keeps every line in memory.
#[derive(Default)]
pub struct CollectingReporter {
    lines: Mutex<Vec<String>>,
    signals: Mutex<Vec<SignalRecord>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn signals(&self) -> Vec<SignalRecord> {
        self.signals.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// True when some status line contains `needle`.
    pub fn saw(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }
}

impl ScanReporter for CollectingReporter {
    fn report(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }

    fn signal(&self, record: &SignalRecord) {
        if let Ok(mut signals) = self.signals.lock() {
            signals.push(record.clone());
        }
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(format!("  {record}"));
        }
    }
}
