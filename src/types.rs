//! Core types used throughout the pipeline
//!
//! Kline rows as returned by the exchange, the supported intervals and the
//! run mode that decides whether labels may be computed.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PipelineError, Result};

/// Column names of a raw kline row, in exchange order.
pub const KLINE_COLUMNS: [&str; 12] = [
    "open_time",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "close_time",
    "quote_asset_volume",
    "number_of_trades",
    "taker_buy_base_asset_volume",
    "taker_buy_quote_asset_volume",
    "ignore",
];

/// Supported kline intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
}

impl Default for Interval {
    fn default() -> Self {
        Interval::Hour1
    }
}

impl Interval {
    /// Get duration in seconds
    pub fn duration_secs(&self) -> u64 {
        match self {
            Interval::Min15 => 15 * 60,
            Interval::Min30 => 30 * 60,
            Interval::Hour1 => 60 * 60,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        self.duration_secs() as i64 * 1000
    }

    /// Exchange wire name ("15m", "30m", "1h")
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Min15 => "15m",
            Interval::Min30 => "30m",
            Interval::Hour1 => "1h",
        }
    }

    /// Parse from string. Anything other than 15m/30m/1h is a hard error.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "15m" | "15min" => Ok(Interval::Min15),
            "30m" | "30min" => Ok(Interval::Min30),
            "1h" | "1hour" | "60m" => Ok(Interval::Hour1),
            other => Err(PipelineError::UnsupportedInterval(other.to_string())),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One OHLCV candle with the exchange's auxiliary fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
    pub quote_asset_volume: f64,
    pub number_of_trades: u64,
    pub taker_buy_base_asset_volume: f64,
    pub taker_buy_quote_asset_volume: f64,
    pub ignore: f64,
}

impl Kline {
    pub fn open_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.open_time).single()
    }

    pub fn close_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.close_time).single()
    }
}

/// A contiguous run of klines from a single fetch, ascending by open time.
#[derive(Debug, Clone, PartialEq)]
pub struct KlineSeries {
    pub symbol: String,
    pub interval: Interval,
    pub klines: Vec<Kline>,
}

impl KlineSeries {
    pub fn new(symbol: impl Into<String>, interval: Interval, klines: Vec<Kline>) -> Self {
        Self {
            symbol: symbol.into(),
            interval,
            klines,
        }
    }

    pub fn len(&self) -> usize {
        self.klines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.klines.is_empty()
    }

    pub fn first_open_time(&self) -> Option<i64> {
        self.klines.first().map(|k| k.open_time)
    }

    pub fn last_open_time(&self) -> Option<i64> {
        self.klines.last().map(|k| k.open_time)
    }

    /// Sort ascending and drop repeated open times, keeping the first occurrence.
    pub fn normalize_order(&mut self) {
        self.klines.sort_by_key(|k| k.open_time);
        self.klines.dedup_by_key(|k| k.open_time);
    }
}

/// Whether the pipeline is fitting on history or applying fitted state to new data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    Training,
    Inference,
}

impl RunMode {
    pub fn is_training(&self) -> bool {
        matches!(self, RunMode::Training)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Training => write!(f, "training"),
            RunMode::Inference => write!(f, "inference"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kline(open_time: i64) -> Kline {
        Kline {
            open_time,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
            close_time: open_time + 3_599_999,
            quote_asset_volume: 0.0,
            number_of_trades: 0,
            taker_buy_base_asset_volume: 0.0,
            taker_buy_quote_asset_volume: 0.0,
            ignore: 0.0,
        }
    }

    #[test]
    fn test_interval_parse() {
        assert_eq!(Interval::parse("15m").unwrap(), Interval::Min15);
        assert_eq!(Interval::parse("30M").unwrap(), Interval::Min30);
        assert_eq!(Interval::parse("1h").unwrap(), Interval::Hour1);
        assert!(matches!(
            Interval::parse("4h"),
            Err(PipelineError::UnsupportedInterval(_))
        ));
    }

    #[test]
    fn test_interval_durations() {
        assert_eq!(Interval::Min15.duration_secs(), 900);
        assert_eq!(Interval::Min30.duration_secs(), 1800);
        assert_eq!(Interval::Hour1.duration_ms(), 3_600_000);
    }

    #[test]
    fn test_series_normalize_order_dedups() {
        let mut series = KlineSeries::new(
            "BTCUSDC",
            Interval::Hour1,
            vec![kline(3), kline(1), kline(2), kline(2)],
        );
        series.normalize_order();
        let times: Vec<i64> = series.klines.iter().map(|k| k.open_time).collect();
        assert_eq!(times, vec![1, 2, 3]);
    }
}
