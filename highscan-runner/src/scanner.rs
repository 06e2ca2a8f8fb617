//! Scan orchestrator: one owner for the downloader, detectors and dedup
//! state, driving one pass at a time.

use crate::config::{ConfigError, ScanConfig};
use crate::report::ScanReporter;
use chrono::{Local, NaiveDateTime};
use highscan_core::data::{FetchError, GroupBy, Interval, MarketDataProvider, Period, RetryingDownloader};
use highscan_core::domain::{SeriesMap, Ticker};
use highscan_core::signals::{
    benchmark_move, BreakoutDetector, DedupState, FreshHighDetector, FreshHighSignal,
    IntradayBoostDetector, SignalRecord,
};
use tracing::{debug, info, warn};

/// Daily sessions the standalone fresh-high screen downloads at minimum.
pub const SCREEN_LOOKBACK_SESSIONS: usize = 400;

/// What one pass did.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub started_at: NaiveDateTime,
    pub active: usize,
    pub skipped: usize,
    /// Intraday series received (benchmark included).
    pub intraday_series: usize,
    /// Daily series received.
    pub daily_series: usize,
    pub signals: Vec<SignalRecord>,
}

impl ScanReport {
    fn new(started_at: NaiveDateTime, active: usize, skipped: usize) -> Self {
        Self {
            started_at,
            active,
            skipped,
            intraday_series: 0,
            daily_series: 0,
            signals: Vec::new(),
        }
    }

    /// True when the pass had nothing to scan.
    pub fn is_idle(&self) -> bool {
        self.active == 0
    }
}

/// Owns all mutable scan state for the process lifetime.
pub struct Scanner {
    config: ScanConfig,
    symbols: Vec<Ticker>,
    benchmark: Ticker,
    downloader: RetryingDownloader,
    fresh_high: FreshHighDetector,
    intraday: IntradayBoostDetector,
    breakout: BreakoutDetector,
    dedup: DedupState,
}

impl Scanner {
    /// Build a scanner over `symbols` (normalized, sorted and deduplicated
    /// by the caller).
    pub fn new(
        config: ScanConfig,
        symbols: Vec<Ticker>,
        provider: Box<dyn MarketDataProvider>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let benchmark = config.benchmark_ticker()?;
        let breakout = BreakoutDetector::new(&config.breakout_lookbacks);
        let downloader = RetryingDownloader::new(
            provider,
            config.retry_policy(),
            config.max_failures,
            symbols.iter().cloned(),
        );

        Ok(Self {
            fresh_high: FreshHighDetector::new(config.fresh_high_window, config.fresh_high_tolerance),
            intraday: IntradayBoostDetector::new(config.volume_threshold),
            dedup: DedupState::new(breakout.lookbacks()),
            breakout,
            benchmark,
            downloader,
            symbols,
            config,
        })
    }

    pub fn downloader(&self) -> &RetryingDownloader {
        &self.downloader
    }

    pub fn dedup(&self) -> &DedupState {
        &self.dedup
    }

    /// Symbol set minus the skip set, in symbol-set order.
    pub fn active_symbols(&self) -> Vec<Ticker> {
        let ledger = self.downloader.ledger();
        self.symbols
            .iter()
            .filter(|t| !ledger.is_skipped(t))
            .cloned()
            .collect()
    }

    /// Daily sessions needed by the breakout lookbacks and the fresh-high
    /// window.
    fn daily_sessions(&self) -> usize {
        self.breakout
            .required_sessions()
            .max(self.fresh_high.window + 1)
    }

    /// One full pass. Never fails: download problems degrade to "no data"
    /// lines for the detectors that needed the data.
    pub fn scan_once(&mut self, reporter: &dyn ScanReporter) -> ScanReport {
        let now = Local::now().naive_local();
        let stamp = now.format("%Y-%m-%d %H:%M").to_string();
        let active = self.active_symbols();
        let skipped = self.symbols.len() - active.len();
        let mut report = ScanReport::new(now, active.len(), skipped);

        reporter.report(&format!(
            "\n[{stamp}] Starting full scan ({} active, {skipped} skipped)",
            active.len()
        ));
        if active.is_empty() {
            reporter.report("No active symbols to scan.");
            return report;
        }

        let mut intraday_request = active.clone();
        intraday_request.push(self.benchmark.clone());
        let intraday_interval = self.config.interval.clone();
        let intraday = self.fetch(
            &intraday_request,
            Period::Session,
            &intraday_interval,
            GroupBy::Ticker,
            "intraday",
        );

        let daily = self.fetch(
            &active,
            Period::Sessions(self.daily_sessions()),
            &Interval::daily(),
            GroupBy::Column,
            "daily",
        );

        report.intraday_series = intraday.len();
        report.daily_series = daily.len();

        self.report_fresh_highs(&stamp, &daily, reporter, &mut report);
        self.report_intraday(&stamp, &active, &intraday, reporter, &mut report);
        self.report_breakouts(&stamp, &active, &daily, &intraday, reporter, &mut report);

        info!(
            "scan pass done: {} active, {} skipped, {} signal(s)",
            report.active,
            report.skipped,
            report.signals.len()
        );
        report
    }

    /// Standalone fresh-high screen over `tickers` (or the whole symbol set
    /// when empty).
    pub fn fresh_high_screen(
        &mut self,
        tickers: &[Ticker],
        reporter: &dyn ScanReporter,
    ) -> Vec<FreshHighSignal> {
        let tickers = if tickers.is_empty() {
            self.active_symbols()
        } else {
            tickers.to_vec()
        };
        let sessions = SCREEN_LOOKBACK_SESSIONS.max(self.fresh_high.window + 5);
        let daily = self.fetch(
            &tickers,
            Period::Sessions(sessions),
            &Interval::daily(),
            GroupBy::Ticker,
            "daily",
        );

        let signals = self.fresh_high.detect(&daily);
        if daily.is_empty() {
            reporter.report("  no daily data");
        } else if signals.is_empty() {
            reporter.report("  no fresh 52-week highs");
        }
        for signal in &signals {
            reporter.signal(&signal.clone().into());
        }
        signals
    }

    /// Download through the retrying downloader; exhaustion is logged and
    /// yields an empty map.
    fn fetch(
        &mut self,
        tickers: &[Ticker],
        period: Period,
        interval: &Interval,
        group_by: GroupBy,
        label: &str,
    ) -> SeriesMap {
        match self
            .downloader
            .fetch_series(tickers, period, interval, group_by, label)
        {
            Ok(map) => map,
            Err(FetchError::Exhausted { label, attempts, last }) => {
                warn!("{label}: no data after {attempts} attempt(s): {last}");
                SeriesMap::new()
            }
            Err(e) => {
                warn!("{label}: download failed: {e}");
                SeriesMap::new()
            }
        }
    }

    fn report_fresh_highs(
        &self,
        stamp: &str,
        daily: &SeriesMap,
        reporter: &dyn ScanReporter,
        report: &mut ScanReport,
    ) {
        reporter.report(&format!("\n[{stamp}] Fresh 52-week highs:"));
        if daily.is_empty() {
            reporter.report("  no daily data");
            return;
        }
        for signal in self.fresh_high.detect(daily) {
            emit(reporter, report, signal.into());
        }
    }

    fn report_intraday(
        &mut self,
        stamp: &str,
        active: &[Ticker],
        intraday: &SeriesMap,
        reporter: &dyn ScanReporter,
        report: &mut ScanReport,
    ) {
        reporter.report(&format!("\n[{stamp}] Intraday Boost:"));
        let bench_move = match intraday.get(&self.benchmark).map(benchmark_move) {
            Some(Ok(m)) => m,
            Some(Err(reason)) => {
                debug!("{}: benchmark unusable: {reason}", self.benchmark);
                reporter.report("  no index data yet");
                return;
            }
            None => {
                reporter.report("  no index data yet");
                return;
            }
        };

        for signal in self
            .intraday
            .detect(active, intraday, bench_move, self.dedup.intraday_mut())
        {
            emit(reporter, report, signal.into());
        }
    }

    fn report_breakouts(
        &mut self,
        stamp: &str,
        active: &[Ticker],
        daily: &SeriesMap,
        intraday: &SeriesMap,
        reporter: &dyn ScanReporter,
        report: &mut ScanReport,
    ) {
        for &n in self.breakout.lookbacks() {
            reporter.report(&format!("\n[{stamp}] {n}-Day Breakout Beacon:"));
            if daily.is_empty() {
                reporter.report("  no daily data");
                continue;
            }
            let seen = self.dedup.breakout_mut(n);
            for signal in self.breakout.detect_period(n, active, daily, intraday, seen) {
                emit(reporter, report, signal.into());
            }
        }
    }
}

fn emit(reporter: &dyn ScanReporter, report: &mut ScanReport, record: SignalRecord) {
    reporter.signal(&record);
    report.signals.push(record);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::CollectingReporter;
    use highscan_core::data::{DownloadRequest, RawDownload};

    struct Offline;

    impl MarketDataProvider for Offline {
        fn name(&self) -> &str {
            "offline"
        }

        fn download(&self, _request: &DownloadRequest) -> Result<RawDownload, FetchError> {
            Err(FetchError::NetworkUnreachable("offline".into()))
        }
    }

    fn config() -> ScanConfig {
        ScanConfig {
            backoff_base_secs: 0.0,
            retries: 1,
            ..ScanConfig::default()
        }
    }

    fn t(s: &str) -> Ticker {
        Ticker::parse(s).unwrap()
    }

    #[test]
    fn offline_pass_degrades_to_no_data() {
        let mut scanner = Scanner::new(config(), vec![t("TCS")], Box::new(Offline)).unwrap();
        let reporter = CollectingReporter::new();
        let report = scanner.scan_once(&reporter);

        assert!(report.signals.is_empty());
        assert!(reporter.saw("no index data yet"));
        assert!(reporter.saw("no daily data"));
        assert!(reporter.saw("50-Day Breakout Beacon"));
    }

    #[test]
    fn nothing_to_scan_once_everything_is_skipped() {
        let mut scanner = Scanner::new(config(), vec![t("TCS")], Box::new(Offline)).unwrap();
        let reporter = CollectingReporter::new();
        // Intraday and daily each charge one failure per pass
        scanner.scan_once(&reporter);
        scanner.scan_once(&reporter);

        assert!(scanner.active_symbols().is_empty());
        let report = scanner.scan_once(&reporter);
        assert!(report.is_idle());
        assert_eq!(report.skipped, 1);
        assert!(reporter.saw("No active symbols to scan."));
    }

    #[test]
    fn daily_history_covers_fresh_high_window() {
        let cfg = ScanConfig {
            breakout_lookbacks: vec![20],
            ..config()
        };
        let scanner = Scanner::new(cfg, vec![t("TCS")], Box::new(Offline)).unwrap();
        assert_eq!(scanner.daily_sessions(), 253);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = ScanConfig {
            retries: 0,
            ..config()
        };
        assert!(Scanner::new(cfg, vec![t("TCS")], Box::new(Offline)).is_err());
    }
}
