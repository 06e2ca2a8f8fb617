//! End-to-end scan passes against an in-memory market.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use highscan_core::data::{
    frame_from_rows, DownloadRequest, FetchError, MarketDataProvider, Period, RawBar, RawDownload,
};
use highscan_core::domain::Ticker;
use highscan_core::signals::{Direction, SignalKind, SignalRecord};
use highscan_runner::{run_schedule, CollectingReporter, ScanConfig, Scanner, Schedule};
use polars::prelude::DataFrame;
use proptest::prelude::*;
use std::collections::BTreeMap;

fn t(s: &str) -> Ticker {
    Ticker::parse(s).unwrap()
}

fn raw(timestamp: NaiveDateTime, open: f64, high: f64, low: f64, close: f64, volume: f64) -> RawBar {
    RawBar {
        timestamp,
        open: Some(open),
        high: Some(high),
        low: Some(low),
        close: Some(close),
        volume: Some(volume),
    }
}

fn day(i: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::days(i as i64)
}

fn bar_time(i: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 15)
        .unwrap()
        .and_hms_opt(9, 15, 0)
        .unwrap()
        + Duration::minutes(5 * i as i64)
}

/// 400 quiet sessions under 100.0, then `today`.
fn daily_history(today: RawBar) -> Vec<RawBar> {
    let mut rows: Vec<RawBar> = (0..400)
        .map(|i| raw(day(i), 95.0, if i == 300 { 100.0 } else { 98.0 }, 90.0, 96.0, 1e5))
        .collect();
    rows.push(RawBar {
        timestamp: day(400),
        ..today
    });
    rows
}

/// Canned daily and intraday rows; any request touching a ticker in
/// `broken` fails outright.
struct Market {
    daily: BTreeMap<Ticker, Vec<RawBar>>,
    intraday: BTreeMap<Ticker, Vec<RawBar>>,
    broken: Vec<Ticker>,
}

impl Market {
    fn nse() -> Self {
        let mut daily = BTreeMap::new();
        let mut intraday = BTreeMap::new();

        // TCS: new high on the day, volume surging through the session
        daily.insert(t("TCS"), daily_history(raw(day(0), 100.0, 103.0, 99.0, 102.0, 3e5)));
        intraday.insert(
            t("TCS"),
            vec![
                raw(bar_time(0), 100.0, 101.0, 99.5, 101.0, 1_000.0),
                raw(bar_time(1), 102.0, 103.0, 101.5, 103.0, 3_000.0),
            ],
        );

        // INFY: inside day, flat volume
        daily.insert(t("INFY"), daily_history(raw(day(0), 95.0, 97.0, 94.0, 96.0, 1e5)));
        intraday.insert(
            t("INFY"),
            vec![
                raw(bar_time(0), 95.0, 95.5, 94.5, 95.2, 1_000.0),
                raw(bar_time(1), 95.2, 96.0, 95.0, 96.0, 1_100.0),
            ],
        );

        intraday.insert(
            t("^NSEI"),
            vec![
                raw(bar_time(0), 22_000.0, 22_080.0, 21_990.0, 22_050.0, 0.0),
                raw(bar_time(1), 22_050.0, 22_120.0, 22_040.0, 22_110.0, 0.0),
            ],
        );

        Self {
            daily,
            intraday,
            broken: vec![t("BAD")],
        }
    }
}

impl MarketDataProvider for Market {
    fn name(&self) -> &str {
        "market"
    }

    fn download(&self, request: &DownloadRequest) -> Result<RawDownload, FetchError> {
        if request.tickers.iter().any(|t| self.broken.contains(t)) {
            return Err(FetchError::Http {
                status: 500,
                symbol: "BAD.NS".into(),
            });
        }

        let source = match request.period {
            Period::Session => &self.intraday,
            Period::Sessions(_) => &self.daily,
        };

        let mut out: Option<DataFrame> = None;
        for ticker in &request.tickers {
            let Some(rows) = source.get(ticker) else {
                continue;
            };
            let df = frame_from_rows(Some(ticker.as_str()), rows).unwrap();
            match out.as_mut() {
                Some(acc) => {
                    acc.vstack_mut(&df).unwrap();
                }
                None => out = Some(df),
            }
        }
        Ok(out.map_or(RawDownload::Empty, RawDownload::Keyed))
    }
}

fn config() -> ScanConfig {
    ScanConfig {
        backoff_base_secs: 0.0,
        retries: 2,
        batch_size: 1,
        ..ScanConfig::default()
    }
}

fn scanner() -> Scanner {
    Scanner::new(
        config(),
        vec![t("BAD"), t("INFY"), t("TCS")],
        Box::new(Market::nse()),
    )
    .unwrap()
}

fn kinds(signals: &[SignalRecord]) -> Vec<SignalKind> {
    signals.iter().map(SignalRecord::kind).collect()
}

#[test]
fn first_pass_emits_every_detector() {
    let mut scanner = scanner();
    let reporter = CollectingReporter::new();
    let report = scanner.scan_once(&reporter);

    assert_eq!(report.active, 3);
    assert_eq!(
        kinds(&report.signals),
        vec![
            SignalKind::FreshHigh,
            SignalKind::IntradayBoost,
            SignalKind::Breakout,
            SignalKind::Breakout,
            SignalKind::Breakout,
            SignalKind::Breakout,
        ]
    );
    assert!(report.signals.iter().all(|s| s.ticker() == &t("TCS")));

    let SignalRecord::IntradayBoost(boost) = &report.signals[1] else {
        panic!("expected an intraday boost");
    };
    assert!((boost.spike - 3.0).abs() < 1e-12);

    let SignalRecord::Breakout(breakout) = &report.signals[2] else {
        panic!("expected a breakout");
    };
    assert_eq!(breakout.lookback, 50);
    assert_eq!(breakout.direction, Direction::Bull);
    assert_eq!(breakout.time_label(), "09:20");
    // The 100.0 high is older than 50 sessions; the 50-day level is 98.0
    assert!((breakout.signal_pct - (102.0 - 98.0) / 98.0 * 100.0).abs() < 1e-9);
}

#[test]
fn later_passes_only_repeat_fresh_highs() {
    let mut scanner = scanner();
    let reporter = CollectingReporter::new();
    scanner.scan_once(&reporter);
    let second = scanner.scan_once(&reporter);

    assert_eq!(kinds(&second.signals), vec![SignalKind::FreshHigh]);
    assert!(scanner.dedup().intraday().contains(&t("TCS")));
    for n in [50, 100, 200, 365] {
        assert!(scanner.dedup().breakout(n).unwrap().contains(&t("TCS")));
    }
}

#[test]
fn failing_ticker_is_skipped_after_max_failures() {
    let mut scanner = scanner();
    let reporter = CollectingReporter::new();

    // Intraday and daily downloads each charge BAD once per pass
    scanner.scan_once(&reporter);
    assert_eq!(scanner.downloader().ledger().failures(&t("BAD")), 2);
    assert!(!scanner.downloader().ledger().is_skipped(&t("BAD")));

    scanner.scan_once(&reporter);
    assert!(scanner.downloader().ledger().is_skipped(&t("BAD")));
    assert_eq!(
        scanner.downloader().ledger().skip_set().iter().collect::<Vec<_>>(),
        vec![&t("BAD")]
    );

    let third = scanner.scan_once(&reporter);
    assert_eq!(third.active, 2);
    assert_eq!(third.skipped, 1);
    assert_eq!(scanner.active_symbols(), vec![t("INFY"), t("TCS")]);
    assert_eq!(
        scanner.downloader().ledger().failures(&t("BAD")),
        4,
        "skipped tickers are no longer requested"
    );
}

#[test]
fn benchmark_failures_are_never_charged() {
    let mut market = Market::nse();
    market.intraday.remove(&t("^NSEI"));
    let mut scanner = Scanner::new(config(), vec![t("TCS")], Box::new(market)).unwrap();
    let reporter = CollectingReporter::new();

    for _ in 0..4 {
        scanner.scan_once(&reporter);
    }
    assert!(reporter.saw("no index data yet"));
    assert_eq!(scanner.downloader().ledger().failures(&t("^NSEI")), 0);
    assert_eq!(scanner.active_symbols(), vec![t("TCS")]);
}

#[test]
fn bounded_schedule_runs_requested_cycles() {
    let mut scanner = scanner();
    let reporter = CollectingReporter::new();
    let schedule = Schedule::new(std::time::Duration::from_millis(1));

    let mut totals = Vec::new();
    let passes = run_schedule(&mut scanner, &schedule, &reporter, Some(3), |r| {
        totals.push(r.signals.len())
    });

    assert_eq!(passes, 3);
    assert_eq!(totals, vec![6, 1, 1]);
}

#[test]
fn fresh_high_screen_over_given_tickers() {
    let mut scanner = scanner();
    let reporter = CollectingReporter::new();
    let highs = scanner.fresh_high_screen(&[t("INFY"), t("TCS")], &reporter);
    assert_eq!(highs.len(), 1);
    assert_eq!(highs[0].ticker, t("TCS"));
    assert_eq!(highs[0].prior_high, 100.0);
}

proptest! {
    /// The wait before the next pass never exceeds the cadence, and an
    /// overrun means no wait at all.
    #[test]
    fn schedule_delay_bounds(cadence in 1u64..10_000, elapsed in 0u64..20_000) {
        let schedule = Schedule::new(std::time::Duration::from_millis(cadence));
        let delay = schedule.next_delay(std::time::Duration::from_millis(elapsed));
        prop_assert!(delay <= schedule.cadence());
        prop_assert_eq!(delay.is_zero(), elapsed >= cadence);
    }
}
