//! Paginated historical kline fetch
//!
//! Walks an exchange klines endpoint from a start time up to now, one page at
//! a time, retrying every request with linear backoff.

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod binance;

pub use binance::BinanceKlineClient;

use crate::config::{FetchSettings, FetchStep};
use crate::error::{PipelineError, Result, SourceError};
use crate::types::{Interval, Kline, KlineSeries};

/// Hard page-size cap of the exchange
pub const MAX_PAGE_LIMIT: usize = 1000;

/// One klines request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KlineRequest {
    pub symbol: String,
    pub interval: Interval,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub limit: usize,
}

/// A source of kline pages. An empty page means there is no more data.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KlineSource: Send + Sync {
    async fn fetch_klines(&self, request: &KlineRequest) -> std::result::Result<Vec<Kline>, SourceError>;
}

/// Linear backoff: `min(base * attempt, max)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &FetchSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.retry_base_delay_ms),
            max_delay: Duration::from_millis(settings.retry_max_delay_ms),
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        std::cmp::min(self.base_delay * attempt, self.max_delay)
    }
}

pub struct HistoricalFetcher<S> {
    source: S,
    policy: RetryPolicy,
    page_limit: usize,
    page_delay: Duration,
}

impl<S: KlineSource> HistoricalFetcher<S> {
    pub fn new(source: S, settings: &FetchSettings) -> Self {
        Self {
            source,
            policy: RetryPolicy::from_settings(settings),
            page_limit: settings.page_limit.clamp(1, MAX_PAGE_LIMIT),
            page_delay: Duration::from_millis(settings.page_delay_ms),
        }
    }

    /// Every kline from `start` up to now
    pub async fn fetch_full_history(
        &self,
        symbol: &str,
        interval: &str,
        start: &str,
    ) -> Result<KlineSeries> {
        let interval = Interval::parse(interval)?;
        let start_ms = parse_start(start)?;
        self.fetch_from(symbol, interval, start_ms).await
    }

    /// The most recent `lookback` ("90m", "10h", "2d") of klines
    pub async fn fetch_recent(
        &self,
        symbol: &str,
        interval: &str,
        lookback: &str,
    ) -> Result<KlineSeries> {
        let interval = Interval::parse(interval)?;
        let window = parse_lookback(lookback)?;
        let start_ms = Utc::now().timestamp_millis() - window;
        self.fetch_from(symbol, interval, start_ms).await
    }

    async fn fetch_from(&self, symbol: &str, interval: Interval, start_ms: i64) -> Result<KlineSeries> {
        info!(
            symbol = %symbol,
            interval = %interval,
            start_ms,
            "📥 Fetching historical klines..."
        );

        // The first candle at or after start gives the real cursor
        let probe = self
            .with_retry(&KlineRequest {
                symbol: symbol.to_string(),
                interval,
                start_time: start_ms,
                end_time: None,
                limit: 1,
            })
            .await?;
        let Some(first) = probe.first() else {
            return Err(PipelineError::NoData {
                symbol: symbol.to_string(),
                interval: interval.to_string(),
            });
        };

        let mut cursor = first.open_time;
        let now = Utc::now().timestamp_millis();
        let expected = ((now - cursor).max(0) / interval.duration_ms()) as usize;
        let budget = expected.div_ceil(self.page_limit).max(1);
        debug!(expected, budget, "Pagination budget computed");

        let mut klines = probe;
        for page in 0..budget {
            let rows = self
                .with_retry(&KlineRequest {
                    symbol: symbol.to_string(),
                    interval,
                    start_time: cursor,
                    end_time: None,
                    limit: self.page_limit,
                })
                .await?;
            let Some(last) = rows.last() else {
                debug!(page, "Empty page, end of data");
                break;
            };
            cursor = last.open_time + 1;
            debug!(page, rows = rows.len(), cursor, "Page fetched");
            klines.extend(rows);

            if page + 1 < budget && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
        }

        let mut series = KlineSeries::new(symbol, interval, klines);
        series.normalize_order();
        info!(
            symbol = %symbol,
            interval = %interval,
            count = series.len(),
            "✅ Historical klines fetched"
        );
        Ok(series)
    }

    /// Run one request under the retry policy
    async fn with_retry(&self, request: &KlineRequest) -> Result<Vec<Kline>> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.source.fetch_klines(request).await {
                Ok(rows) => return Ok(rows),
                Err(e) if attempt >= self.policy.max_attempts => {
                    return Err(PipelineError::Fetch {
                        symbol: request.symbol.clone(),
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    let delay = self.policy.delay(attempt);
                    warn!(
                        symbol = %request.symbol,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        error = %e,
                        "Kline request failed, retrying in {:?}",
                        delay
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}

/// Resolve "1 Jan, 2020", "2020-01-01" or an epoch-millis string
pub fn parse_start(start: &str) -> Result<i64> {
    let s = start.trim();
    if let Ok(ms) = s.parse::<i64>() {
        return Ok(ms);
    }
    ["%d %b, %Y", "%Y-%m-%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt).timestamp_millis())
        .ok_or_else(|| PipelineError::InvalidStart(start.to_string()))
}

/// Lookback like "90m", "10h" or "2d" in milliseconds
pub fn parse_lookback(lookback: &str) -> Result<i64> {
    let s = lookback.trim();
    let invalid = || PipelineError::InvalidStart(lookback.to_string());
    if s.len() < 2 {
        return Err(invalid());
    }
    let (amount, unit) = s.split_at(s.len() - 1);
    let amount: i64 = amount.parse().map_err(|_| invalid())?;
    let unit_ms = match unit {
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        _ => return Err(invalid()),
    };
    if amount <= 0 {
        return Err(invalid());
    }
    Ok(amount * unit_ms)
}

/// Result of one step in a batch fetch job
#[derive(Debug)]
pub struct StepOutcome {
    pub name: String,
    pub result: Result<KlineSeries>,
}

/// Run every step in order. A failed step is logged and the batch moves on.
pub async fn fetch_sequence<S: KlineSource>(
    fetcher: &HistoricalFetcher<S>,
    steps: &[FetchStep],
) -> Vec<StepOutcome> {
    let mut outcomes = Vec::with_capacity(steps.len());
    for step in steps {
        info!("🔄 Fetch step '{}': {} {} from {}", step.name, step.symbol, step.interval, step.start);
        let result = fetcher
            .fetch_full_history(&step.symbol, &step.interval, &step.start)
            .await;
        if let Err(e) = &result {
            warn!(step = %step.name, kind = ?e.kind(), "Fetch step failed, continuing: {}", e);
        }
        outcomes.push(StepOutcome {
            name: step.name.clone(),
            result,
        });
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;

    const JAN_2024: i64 = 1_704_067_200_000;

    fn settings() -> FetchSettings {
        FetchSettings {
            max_attempts: 3,
            retry_base_delay_ms: 0,
            page_delay_ms: 0,
            ..FetchSettings::default()
        }
    }

    fn kline(open_time: i64) -> Kline {
        Kline {
            open_time,
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 10.0,
            close_time: open_time + 3_599_999,
            quote_asset_volume: 15.0,
            number_of_trades: 3,
            taker_buy_base_asset_volume: 5.0,
            taker_buy_quote_asset_volume: 7.5,
            ignore: 0.0,
        }
    }

    #[tokio::test]
    async fn test_single_row_then_empty_page() {
        let mut source = MockKlineSource::new();
        let mut seq = Sequence::new();
        source
            .expect_fetch_klines()
            .withf(|req| req.limit == 1)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![kline(JAN_2024)]));
        source
            .expect_fetch_klines()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![]));

        let fetcher = HistoricalFetcher::new(source, &settings());
        let series = fetcher
            .fetch_full_history("BTCUSDC", "1h", "2024-01-01")
            .await
            .unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.first_open_time(), Some(JAN_2024));
    }

    #[tokio::test]
    async fn test_always_failing_source_exhausts_attempts() {
        let mut source = MockKlineSource::new();
        source
            .expect_fetch_klines()
            .times(3)
            .returning(|_| Err(SourceError::RateLimited { status: 429 }));

        let fetcher = HistoricalFetcher::new(source, &settings());
        let err = fetcher
            .fetch_full_history("BTCUSDC", "1h", "1 Jan, 2024")
            .await
            .unwrap_err();
        match err {
            PipelineError::Fetch { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pages_are_sorted_and_deduplicated() {
        let hour = 3_600_000;
        let mut source = MockKlineSource::new();
        let mut seq = Sequence::new();
        source
            .expect_fetch_klines()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(vec![kline(JAN_2024)]));
        source
            .expect_fetch_klines()
            .withf(move |req| req.start_time == JAN_2024)
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(vec![kline(JAN_2024), kline(JAN_2024 + hour)]));
        source
            .expect_fetch_klines()
            .withf(move |req| req.start_time == JAN_2024 + hour + 1)
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(vec![kline(JAN_2024 + 2 * hour), kline(JAN_2024 + hour)]));
        source
            .expect_fetch_klines()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![]));

        let fetcher = HistoricalFetcher::new(source, &settings());
        let series = fetcher
            .fetch_full_history("BTCUSDC", "1h", &JAN_2024.to_string())
            .await
            .unwrap();
        let times: Vec<i64> = series.klines.iter().map(|k| k.open_time).collect();
        assert_eq!(times, vec![JAN_2024, JAN_2024 + hour, JAN_2024 + 2 * hour]);
    }

    #[tokio::test]
    async fn test_empty_probe_is_no_data() {
        let mut source = MockKlineSource::new();
        source.expect_fetch_klines().times(1).returning(|_| Ok(vec![]));
        let fetcher = HistoricalFetcher::new(source, &settings());
        let err = fetcher
            .fetch_full_history("BTCUSDC", "15m", "2024-01-01")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoData { .. }));
        assert!(err.is_skippable());
    }

    #[tokio::test]
    async fn test_unsupported_interval_never_calls_source() {
        let mut source = MockKlineSource::new();
        source.expect_fetch_klines().times(0);
        let fetcher = HistoricalFetcher::new(source, &settings());
        let err = fetcher
            .fetch_full_history("BTCUSDC", "4h", "2024-01-01")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedInterval(_)));
    }

    #[tokio::test]
    async fn test_fetch_sequence_continues_after_failure() {
        let mut source = MockKlineSource::new();
        let mut seq = Sequence::new();
        source
            .expect_fetch_klines()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![kline(JAN_2024)]));
        source
            .expect_fetch_klines()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![]));

        let steps = vec![
            FetchStep {
                name: "bad".into(),
                symbol: "BTCUSDC".into(),
                interval: "1h".into(),
                start: "yesterday".into(),
            },
            FetchStep {
                name: "good".into(),
                symbol: "BTCUSDC".into(),
                interval: "1h".into(),
                start: "2024-01-01".into(),
            },
        ];
        let fetcher = HistoricalFetcher::new(source, &settings());
        let outcomes = fetch_sequence(&fetcher, &steps).await;
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0].result, Err(PipelineError::InvalidStart(_))));
        assert_eq!(outcomes[1].result.as_ref().map(|s| s.len()).ok(), Some(1));
    }

    #[test]
    fn test_parse_start_formats() {
        assert_eq!(parse_start("1 Jan, 2024").unwrap(), JAN_2024);
        assert_eq!(parse_start("2024-01-01").unwrap(), JAN_2024);
        assert_eq!(parse_start("1704067200000").unwrap(), JAN_2024);
        assert!(matches!(
            parse_start("Jan 1st"),
            Err(PipelineError::InvalidStart(_))
        ));
    }

    #[test]
    fn test_parse_lookback() {
        assert_eq!(parse_lookback("2d").unwrap(), 2 * 86_400_000);
        assert_eq!(parse_lookback("90m").unwrap(), 90 * 60_000);
        assert!(parse_lookback("3w").is_err());
        assert!(parse_lookback("h").is_err());
    }

    #[test]
    fn test_linear_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(2500),
        };
        assert_eq!(policy.delay(1), Duration::from_millis(1000));
        assert_eq!(policy.delay(2), Duration::from_millis(2000));
        assert_eq!(policy.delay(4), Duration::from_millis(2500));
    }
}
