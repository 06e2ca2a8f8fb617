//! Yahoo Finance data provider.
//!
//! Fetches OHLCV bars from Yahoo's v8 chart API, one request per ticker,
//! and assembles the batch into a polars frame. Timestamps are shifted by
//! the exchange GMT offset the chart reports, so bars carry exchange-local
//! wall-clock time.
//!
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes; those surface as `FetchError::ResponseFormatChanged`.

use super::provider::{
    DownloadRequest, FetchError, GroupBy, Interval, MarketDataProvider, Period, RawBar,
    RawDownload, MAX_HISTORY_SESSIONS,
};
use super::schema::frame_from_rows;
use crate::domain::Ticker;
use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const CHART_BASE_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Calendar days that cover `sessions` trading sessions, with slack for
/// holidays. Capped at `MAX_HISTORY_SESSIONS`.
pub fn sessions_to_calendar_days(sessions: usize) -> i64 {
    let sessions = sessions.min(MAX_HISTORY_SESSIONS) as i64;
    sessions * 365 / 252 + 10
}

/// Yahoo Finance data provider.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl YahooProvider {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| FetchError::NetworkUnreachable(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base_url: CHART_BASE_URL.to_string(),
        })
    }

    /// Point the provider at another chart endpoint (mirrors, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build the chart API URL for a symbol.
    fn chart_url(&self, symbol: &str, period: Period, interval: &Interval, now: DateTime<Utc>) -> String {
        match period {
            Period::Session => format!(
                "{}/{symbol}?range=1d&interval={interval}&includePrePost=false",
                self.base_url
            ),
            Period::Sessions(n) => {
                let end = now.timestamp();
                let start = end - sessions_to_calendar_days(n) * 86_400;
                format!(
                    "{}/{symbol}?period1={start}&period2={end}&interval={interval}&includePrePost=false",
                    self.base_url
                )
            }
        }
    }

    /// Parse the chart API response into rows, skipping rows where every
    /// OHLCV cell is missing.
    fn parse_response(symbol: &str, resp: ChartResponse) -> Result<Vec<RawBar>, FetchError> {
        let result = resp.chart.result.ok_or_else(|| {
            if let Some(err) = resp.chart.error {
                if err.code == "Not Found" {
                    FetchError::SymbolNotFound {
                        symbol: symbol.to_string(),
                    }
                } else {
                    FetchError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
                }
            } else {
                FetchError::ResponseFormatChanged("empty result with no error".into())
            }
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::ResponseFormatChanged("result array is empty".into()))?;

        let offset = data.meta.and_then(|m| m.gmtoffset).unwrap_or(0);

        // A chart with no timestamps is a symbol with no trades in range.
        let Some(timestamps) = data.timestamp else {
            return Ok(Vec::new());
        };

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::ResponseFormatChanged("no quote data".into()))?;

        let mut rows = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let timestamp = DateTime::from_timestamp(ts + offset, 0)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| {
                    FetchError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
                })?;

            let row = RawBar {
                timestamp,
                open: quote.open.get(i).copied().flatten(),
                high: quote.high.get(i).copied().flatten(),
                low: quote.low.get(i).copied().flatten(),
                close: quote.close.get(i).copied().flatten(),
                volume: quote.volume.get(i).copied().flatten(),
            };

            // Holidays and halted intervals come back as all-null rows
            if row.open.is_none()
                && row.high.is_none()
                && row.low.is_none()
                && row.close.is_none()
                && row.volume.is_none()
            {
                continue;
            }
            rows.push(row);
        }

        Ok(rows)
    }

    /// One HTTP request for one ticker.
    fn fetch_one(
        &self,
        ticker: &Ticker,
        period: Period,
        interval: &Interval,
    ) -> Result<Vec<RawBar>, FetchError> {
        let symbol = ticker.as_str();
        let url = self.chart_url(symbol, period, interval, Utc::now());

        let resp = self.client.get(&url).send().map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(format!("{symbol}: {e}"))
            } else {
                FetchError::NetworkUnreachable(format!("{symbol}: {e}"))
            }
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(FetchError::RateLimited {
                retry_after_secs: retry_after,
            });
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                symbol: symbol.to_string(),
            });
        }

        let chart: ChartResponse = resp.json().map_err(|e| {
            FetchError::ResponseFormatChanged(format!("failed to parse response for {symbol}: {e}"))
        })?;

        Self::parse_response(symbol, chart)
    }
}

/// Assemble per-ticker rows into the download shape the request asked for.
fn assemble(
    request: &DownloadRequest,
    fetched: Vec<(&Ticker, Vec<RawBar>)>,
) -> Result<RawDownload, FetchError> {
    let polars_err = |e: polars::prelude::PolarsError| {
        FetchError::ResponseFormatChanged(format!("frame assembly: {e}"))
    };

    if fetched.is_empty() {
        return Ok(RawDownload::Empty);
    }

    if request.group_by == GroupBy::Column && request.tickers.len() == 1 {
        let (_, rows) = &fetched[0];
        return Ok(RawDownload::Flat(frame_from_rows(None, rows).map_err(polars_err)?));
    }

    let mut combined: Option<DataFrame> = None;
    for (ticker, rows) in &fetched {
        let df = frame_from_rows(Some(ticker.as_str()), rows).map_err(polars_err)?;
        match combined.as_mut() {
            Some(acc) => {
                acc.vstack_mut(&df).map_err(polars_err)?;
            }
            None => combined = Some(df),
        }
    }

    Ok(combined.map_or(RawDownload::Empty, RawDownload::Keyed))
}

impl MarketDataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    /// Per-ticker failures are logged and left out of the batch; the batch
    /// fails only when no ticker produced rows.
    fn download(&self, request: &DownloadRequest) -> Result<RawDownload, FetchError> {
        let mut fetched = Vec::with_capacity(request.tickers.len());
        let mut last_err = None;

        for ticker in &request.tickers {
            match self.fetch_one(ticker, request.period, &request.interval) {
                Ok(rows) if rows.is_empty() => debug!("{ticker}: no rows in chart response"),
                Ok(rows) => fetched.push((ticker, rows)),
                Err(e) => {
                    warn!("{ticker}: chart request failed: {e}");
                    last_err = Some(e);
                }
            }
        }

        if fetched.is_empty() {
            return Err(last_err.unwrap_or(FetchError::EmptyResponse));
        }
        assemble(request, fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    const SAMPLE: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"symbol": "TCS.NS", "gmtoffset": 19800},
                "timestamp": [1710474300, 1710474600, 1710474900],
                "indicators": {"quote": [{
                    "open":   [100.0, null, 101.0],
                    "high":   [101.0, null, 102.5],
                    "low":    [ 99.5, null, 100.5],
                    "close":  [100.5, null, 102.0],
                    "volume": [1000,  null, 3000]
                }]}
            }],
            "error": null
        }
    }"#;

    fn tickers(raw: &[&str]) -> Vec<Ticker> {
        raw.iter().map(|s| Ticker::parse(s).unwrap()).collect()
    }

    #[test]
    fn parse_skips_null_rows_and_applies_gmt_offset() {
        let resp: ChartResponse = serde_json::from_str(SAMPLE).unwrap();
        let rows = YahooProvider::parse_response("TCS.NS", resp).unwrap();
        assert_eq!(rows.len(), 2);

        // 2024-03-15 03:45 UTC is 09:15 in Mumbai
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap();
        assert_eq!(rows[0].timestamp, expected);
        assert_eq!(rows[1].volume, Some(3000.0));
    }

    #[test]
    fn parse_not_found_error() {
        let json = r#"{"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}}"#;
        let resp: ChartResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            YahooProvider::parse_response("ZZZ.NS", resp),
            Err(FetchError::SymbolNotFound { symbol }) if symbol == "ZZZ.NS"
        ));
    }

    #[test]
    fn chart_url_for_session_and_history() {
        let provider = YahooProvider::new(Duration::from_secs(5))
            .unwrap()
            .with_base_url("http://localhost/chart");
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap();
        let interval: Interval = "5m".parse().unwrap();

        let url = provider.chart_url("TCS.NS", Period::Session, &interval, now);
        assert_eq!(
            url,
            "http://localhost/chart/TCS.NS?range=1d&interval=5m&includePrePost=false"
        );

        let url = provider.chart_url("TCS.NS", Period::Sessions(252), &Interval::daily(), now);
        let start = now.timestamp() - 375 * 86_400;
        assert!(url.contains(&format!("period1={start}")));
        assert!(url.contains("interval=1d"));
    }

    #[test]
    fn session_conversion_has_slack() {
        assert_eq!(sessions_to_calendar_days(0), 10);
        assert_eq!(sessions_to_calendar_days(366), 540);
        assert_eq!(
            sessions_to_calendar_days(usize::MAX),
            sessions_to_calendar_days(MAX_HISTORY_SESSIONS)
        );
    }

    #[test]
    fn single_ticker_column_grouping_is_flat() {
        let resp: ChartResponse = serde_json::from_str(SAMPLE).unwrap();
        let rows = YahooProvider::parse_response("TCS.NS", resp).unwrap();
        let request = DownloadRequest {
            tickers: tickers(&["TCS"]),
            period: Period::Session,
            interval: "5m".parse().unwrap(),
            group_by: GroupBy::Column,
        };
        let out = assemble(&request, vec![(&request.tickers[0], rows)]).unwrap();
        assert!(matches!(out, RawDownload::Flat(ref df) if df.height() == 2));
    }

    #[test]
    fn multi_ticker_batch_is_keyed() {
        let resp: ChartResponse = serde_json::from_str(SAMPLE).unwrap();
        let rows = YahooProvider::parse_response("TCS.NS", resp).unwrap();
        let request = DownloadRequest {
            tickers: tickers(&["TCS", "INFY"]),
            period: Period::Session,
            interval: "5m".parse().unwrap(),
            group_by: GroupBy::Column,
        };
        let out = assemble(
            &request,
            vec![(&request.tickers[0], rows.clone()), (&request.tickers[1], rows)],
        )
        .unwrap();
        assert!(matches!(out, RawDownload::Keyed(ref df) if df.height() == 4));
    }
}
