//! Retrying downloader: bounded retry with backoff, per-ticker failure
//! accounting and the permanent skip set.

use super::normalize::FrameNormalizer;
use super::provider::{
    DownloadRequest, FetchError, GroupBy, Interval, MarketDataProvider, Period, RawDownload,
};
use crate::domain::{dedup_preserving_order, SeriesMap, Ticker};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Per-ticker failure counters and the skip set they feed.
///
/// Counters only ever grow; a successful download does not reset them.
#[derive(Debug, Clone)]
pub struct FailureLedger {
    max_failures: u32,
    counts: BTreeMap<Ticker, u32>,
    skipped: BTreeSet<Ticker>,
}

impl FailureLedger {
    pub fn new(max_failures: u32) -> Self {
        Self {
            max_failures: max_failures.max(1),
            counts: BTreeMap::new(),
            skipped: BTreeSet::new(),
        }
    }

    /// Count one exhausted download against `ticker`.
    ///
    /// Returns true when this call moved the ticker into the skip set.
    pub fn record_failure(&mut self, ticker: &Ticker) -> bool {
        let count = self.counts.entry(ticker.clone()).or_insert(0);
        *count += 1;
        if *count >= self.max_failures {
            self.skipped.insert(ticker.clone())
        } else {
            false
        }
    }

    pub fn failures(&self, ticker: &Ticker) -> u32 {
        self.counts.get(ticker).copied().unwrap_or(0)
    }

    pub fn is_skipped(&self, ticker: &Ticker) -> bool {
        self.skipped.contains(ticker)
    }

    pub fn skip_set(&self) -> &BTreeSet<Ticker> {
        &self.skipped
    }
}

/// Retry settings for one downloader.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per batch (at least 1).
    pub retries: u32,
    /// Attempt `n` failing sleeps `backoff_base * n` before the next one.
    pub backoff_base: Duration,
    /// Largest number of tickers sent in one request.
    pub batch_size: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff_base: Duration::from_secs(2),
            batch_size: 500,
        }
    }
}

impl RetryPolicy {
    /// Sleep after failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(attempt)
    }
}

/// Downloads batches through a provider, retrying and charging exhausted
/// batches to the failure ledger.
///
/// Only tickers in the tracked universe are ever charged; the benchmark
/// and ad-hoc tickers can fail without being skipped.
pub struct RetryingDownloader {
    provider: Box<dyn MarketDataProvider>,
    policy: RetryPolicy,
    tracked: BTreeSet<Ticker>,
    ledger: FailureLedger,
}

impl RetryingDownloader {
    pub fn new(
        provider: Box<dyn MarketDataProvider>,
        policy: RetryPolicy,
        max_failures: u32,
        tracked: impl IntoIterator<Item = Ticker>,
    ) -> Self {
        Self {
            provider,
            policy,
            tracked: tracked.into_iter().collect(),
            ledger: FailureLedger::new(max_failures),
        }
    }

    pub fn ledger(&self) -> &FailureLedger {
        &self.ledger
    }

    /// Download one batch with retry.
    ///
    /// An error or an empty result counts as a failed attempt. When every
    /// attempt fails, tracked tickers in the batch are charged to the
    /// ledger and `FetchError::Exhausted` is returned.
    pub fn download(
        &mut self,
        tickers: &[Ticker],
        period: Period,
        interval: &Interval,
        group_by: GroupBy,
        label: &str,
    ) -> Result<RawDownload, FetchError> {
        let request = DownloadRequest {
            tickers: dedup_preserving_order(tickers),
            period,
            interval: interval.clone(),
            group_by,
        };
        if request.tickers.is_empty() {
            return Ok(RawDownload::Empty);
        }

        let attempts = self.policy.retries.max(1);
        let mut last = FetchError::EmptyResponse;

        for attempt in 1..=attempts {
            match self.provider.download(&request) {
                Ok(raw) if !raw.is_empty() => {
                    debug!(
                        "{label}: {} ticker(s) downloaded on attempt {attempt}",
                        request.tickers.len()
                    );
                    return Ok(raw);
                }
                Ok(_) => last = FetchError::EmptyResponse,
                Err(e) => last = e,
            }

            warn!(
                "{label}: attempt {attempt}/{attempts} failed for {}: {last}",
                preview(&request.tickers)
            );
            if attempt < attempts {
                std::thread::sleep(self.policy.backoff(attempt));
            }
        }

        self.charge_failures(&request.tickers, label, &last);
        Err(FetchError::Exhausted {
            label: label.to_string(),
            attempts,
            last: Box::new(last),
        })
    }

    /// Download `tickers` in chunks of `batch_size`, normalize each chunk
    /// and merge the series.
    ///
    /// Chunks fail independently. The merged map is returned when at least
    /// one chunk came back; otherwise the last chunk's error.
    pub fn fetch_series(
        &mut self,
        tickers: &[Ticker],
        period: Period,
        interval: &Interval,
        group_by: GroupBy,
        label: &str,
    ) -> Result<SeriesMap, FetchError> {
        let tickers = dedup_preserving_order(tickers);
        let mut merged = SeriesMap::new();
        let mut last_err = None;
        let mut any_ok = false;

        for chunk in tickers.chunks(self.policy.batch_size.max(1)) {
            match self.download(chunk, period, interval, group_by, label) {
                Ok(raw) => {
                    any_ok = true;
                    merged.extend(FrameNormalizer::normalize_or_empty(raw, chunk, label));
                }
                Err(e) => last_err = Some(e),
            }
        }

        match last_err {
            Some(e) if !any_ok => Err(e),
            _ => Ok(merged),
        }
    }

    fn charge_failures(&mut self, tickers: &[Ticker], label: &str, cause: &FetchError) {
        for ticker in tickers.iter().filter(|t| self.tracked.contains(*t)) {
            if self.ledger.record_failure(ticker) {
                error!(
                    "{ticker}: skipped for the rest of this run after {} failed downloads ({label}: {cause})",
                    self.ledger.failures(ticker)
                );
            }
        }
    }
}

/// Short ticker list for log lines.
fn preview(tickers: &[Ticker]) -> String {
    const SHOWN: usize = 5;
    let head: Vec<&str> = tickers.iter().take(SHOWN).map(Ticker::as_str).collect();
    if tickers.len() > SHOWN {
        format!("{} (+{} more)", head.join(", "), tickers.len() - SHOWN)
    } else {
        head.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::{df, DataFrame, NamedFrom};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn t(s: &str) -> Ticker {
        Ticker::parse(s).unwrap()
    }

    fn keyed_frame(symbols: &[&Ticker]) -> DataFrame {
        let n = symbols.len();
        df!(
            "timestamp" => vec![1_000i64; n],
            "symbol" => symbols.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            "open" => vec![1.0; n],
            "high" => vec![1.0; n],
            "low" => vec![1.0; n],
            "close" => vec![1.0; n],
            "volume" => vec![1.0; n],
        )
        .unwrap()
    }

    /// Fails the first `fail_first` calls, then answers with a keyed frame.
    struct Flaky {
        fail_first: u32,
        calls: Arc<AtomicU32>,
    }

    impl MarketDataProvider for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn download(&self, request: &DownloadRequest) -> Result<RawDownload, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(FetchError::Timeout("slow".into()));
            }
            let refs: Vec<&Ticker> = request.tickers.iter().collect();
            Ok(RawDownload::Keyed(keyed_frame(&refs)))
        }
    }

    fn downloader(fail_first: u32, tracked: &[Ticker]) -> (RetryingDownloader, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let provider = Flaky {
            fail_first,
            calls: Arc::clone(&calls),
        };
        let policy = RetryPolicy {
            retries: 3,
            backoff_base: Duration::ZERO,
            batch_size: 500,
        };
        (
            RetryingDownloader::new(Box::new(provider), policy, 3, tracked.to_vec()),
            calls,
        )
    }

    #[test]
    fn ledger_skips_at_threshold_once() {
        let mut ledger = FailureLedger::new(2);
        let x = t("X");
        assert!(!ledger.record_failure(&x));
        assert!(ledger.record_failure(&x));
        assert!(!ledger.record_failure(&x), "already skipped");
        assert_eq!(ledger.failures(&x), 3);
        assert!(ledger.is_skipped(&x));
    }

    #[test]
    fn backoff_is_linear_in_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(6));
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let tcs = t("TCS");
        let (mut dl, calls) = downloader(2, &[tcs.clone()]);
        let raw = dl
            .download(&[tcs.clone()], Period::Session, &Interval::daily(), GroupBy::Ticker, "daily")
            .unwrap();
        assert!(!raw.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(dl.ledger().failures(&tcs), 0);
    }

    #[test]
    fn exhaustion_charges_only_tracked_tickers() {
        let tcs = t("TCS");
        let bench = t("^NSEI");
        let (mut dl, calls) = downloader(u32::MAX, &[tcs.clone()]);

        let err = dl
            .download(
                &[tcs.clone(), bench.clone()],
                Period::Session,
                &Interval::daily(),
                GroupBy::Ticker,
                "intraday",
            )
            .unwrap_err();

        assert!(matches!(err, FetchError::Exhausted { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(dl.ledger().failures(&tcs), 1);
        assert_eq!(dl.ledger().failures(&bench), 0);
    }

    #[test]
    fn repeated_exhaustion_moves_ticker_to_skip_set() {
        let tcs = t("TCS");
        let (mut dl, _) = downloader(u32::MAX, &[tcs.clone()]);
        for _ in 0..3 {
            let _ = dl.download(&[tcs.clone()], Period::Session, &Interval::daily(), GroupBy::Ticker, "daily");
        }
        assert!(dl.ledger().is_skipped(&tcs));
    }

    /// Answers each call from a script: `true` succeeds, `false` times out.
    struct Scripted {
        outcomes: Mutex<VecDeque<bool>>,
    }

    impl MarketDataProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn download(&self, request: &DownloadRequest) -> Result<RawDownload, FetchError> {
            let ok = self.outcomes.lock().unwrap().pop_front().unwrap_or(false);
            if !ok {
                return Err(FetchError::Timeout("slow".into()));
            }
            let refs: Vec<&Ticker> = request.tickers.iter().collect();
            Ok(RawDownload::Keyed(keyed_frame(&refs)))
        }
    }

    #[test]
    fn success_between_failures_keeps_the_count() {
        let tcs = t("TCS");
        let provider = Scripted {
            outcomes: Mutex::new(VecDeque::from([false, true, false])),
        };
        let policy = RetryPolicy {
            retries: 1,
            backoff_base: Duration::ZERO,
            batch_size: 500,
        };
        let mut dl = RetryingDownloader::new(Box::new(provider), policy, 2, [tcs.clone()]);
        let fetch = |dl: &mut RetryingDownloader| {
            dl.download(&[tcs.clone()], Period::Session, &Interval::daily(), GroupBy::Ticker, "daily")
        };

        assert!(fetch(&mut dl).is_err());
        assert_eq!(dl.ledger().failures(&tcs), 1);

        assert!(fetch(&mut dl).is_ok());
        assert_eq!(dl.ledger().failures(&tcs), 1, "success does not reset the count");

        assert!(fetch(&mut dl).is_err());
        assert_eq!(dl.ledger().failures(&tcs), 2);
        assert!(dl.ledger().is_skipped(&tcs));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let policy = RetryPolicy {
            backoff_base: Duration::MAX,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(3), Duration::MAX);
    }

    #[test]
    fn fetch_series_chunks_and_merges() {
        let tickers = vec![t("A"), t("B"), t("C")];
        let (mut dl, calls) = downloader(0, &tickers);
        dl.policy.batch_size = 2;

        let map = dl
            .fetch_series(&tickers, Period::Sessions(5), &Interval::daily(), GroupBy::Ticker, "daily")
            .unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_request_is_empty_without_calling_provider() {
        let (mut dl, calls) = downloader(0, &[]);
        let raw = dl
            .download(&[], Period::Session, &Interval::daily(), GroupBy::Ticker, "daily")
            .unwrap();
        assert!(raw.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
