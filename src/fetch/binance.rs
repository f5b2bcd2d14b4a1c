//! Binance spot REST klines source

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{KlineRequest, KlineSource};
use crate::config::FetchSettings;
use crate::error::{PipelineError, Result, SourceError};
use crate::types::Kline;

const KLINES_PATH: &str = "/api/v3/klines";

#[derive(Debug, Clone)]
pub struct BinanceKlineClient {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceKlineClient {
    pub fn new(settings: &FetchSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url, KLINES_PATH)
    }
}

#[async_trait]
impl KlineSource for BinanceKlineClient {
    async fn fetch_klines(&self, request: &KlineRequest) -> std::result::Result<Vec<Kline>, SourceError> {
        let mut query = vec![
            ("symbol", request.symbol.clone()),
            ("interval", request.interval.as_str().to_string()),
            ("startTime", request.start_time.to_string()),
            ("limit", request.limit.to_string()),
        ];
        if let Some(end) = request.end_time {
            query.push(("endTime", end.to_string()));
        }

        let response = self.client.get(self.url()).query(&query).send().await?;
        let status = response.status();
        if status.as_u16() == 429 || status.as_u16() == 418 {
            return Err(SourceError::RateLimited {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        // [[open_time, "open", "high", "low", "close", "volume", close_time, ...], ...]
        let rows: Vec<Vec<Value>> = response.json().await?;
        debug!(rows = rows.len(), start = request.start_time, "Klines page received");
        rows.iter().map(|row| parse_kline_row(row)).collect()
    }
}

fn float_field(row: &[Value], i: usize) -> std::result::Result<f64, SourceError> {
    match row.get(i) {
        Some(Value::String(s)) => s
            .parse()
            .map_err(|_| SourceError::Malformed(format!("field {} is not numeric: {}", i, s))),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| SourceError::Malformed(format!("field {} out of range", i))),
        other => Err(SourceError::Malformed(format!(
            "field {} missing or invalid: {:?}",
            i, other
        ))),
    }
}

fn int_field(row: &[Value], i: usize) -> std::result::Result<i64, SourceError> {
    match row.get(i) {
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| SourceError::Malformed(format!("field {} is not an integer", i))),
        Some(Value::String(s)) => s
            .parse()
            .map_err(|_| SourceError::Malformed(format!("field {} is not an integer: {}", i, s))),
        other => Err(SourceError::Malformed(format!(
            "field {} missing or invalid: {:?}",
            i, other
        ))),
    }
}

/// Parse one 12-field kline row; price and volume fields arrive as strings
pub fn parse_kline_row(row: &[Value]) -> std::result::Result<Kline, SourceError> {
    if row.len() < 12 {
        return Err(SourceError::Malformed(format!(
            "expected 12 fields, got {}",
            row.len()
        )));
    }
    Ok(Kline {
        open_time: int_field(row, 0)?,
        open: float_field(row, 1)?,
        high: float_field(row, 2)?,
        low: float_field(row, 3)?,
        close: float_field(row, 4)?,
        volume: float_field(row, 5)?,
        close_time: int_field(row, 6)?,
        quote_asset_volume: float_field(row, 7)?,
        number_of_trades: int_field(row, 8)?.max(0) as u64,
        taker_buy_base_asset_volume: float_field(row, 9)?,
        taker_buy_quote_asset_volume: float_field(row, 10)?,
        ignore: float_field(row, 11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_kline_row() {
        let row = json!([
            1704067200000i64,
            "42283.58",
            "42554.57",
            "42261.02",
            "42475.23",
            "1271.68108",
            1704070799999i64,
            "53957248.64",
            47134,
            "682.57581",
            "28957416.82",
            "0"
        ]);
        let row = row.as_array().unwrap();
        let k = parse_kline_row(row).unwrap();
        assert_eq!(k.open_time, 1_704_067_200_000);
        assert_eq!(k.close, 42475.23);
        assert_eq!(k.number_of_trades, 47134);
        assert_eq!(k.ignore, 0.0);
    }

    #[test]
    fn test_short_or_bad_rows_are_malformed() {
        let short = json!([1704067200000i64, "1.0"]);
        assert!(matches!(
            parse_kline_row(short.as_array().unwrap()),
            Err(SourceError::Malformed(_))
        ));

        let mut bad = vec![json!(1704067200000i64); 12];
        bad[4] = json!("not-a-price");
        assert!(matches!(parse_kline_row(&bad), Err(SourceError::Malformed(_))));
    }

    #[test]
    fn test_client_url() {
        let settings = FetchSettings {
            base_url: "https://api.binance.com/".into(),
            ..FetchSettings::default()
        };
        let client = BinanceKlineClient::new(&settings).unwrap();
        assert_eq!(client.url(), "https://api.binance.com/api/v3/klines");
    }
}
