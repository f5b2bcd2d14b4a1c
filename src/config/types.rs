//! Settings sections
//!
//! Each section carries its own defaults so a partial settings file only has
//! to name the keys it overrides.

use serde::{Deserialize, Serialize};

use crate::labeling::{classification_column, regression_column};

/// Indicator lookbacks and signal thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorSettings {
    /// Primary oscillator period (RSI/ADX/CCI/MFI/ATR), also used for support/resistance
    pub general_timeperiod: usize,
    /// Extra oscillator periods; `general_timeperiod` is always included
    pub oscillator_periods: Vec<usize>,
    /// Moving-average periods for the vs-MA family
    pub average_periods: Vec<usize>,
    pub bollinger_timeperiod: usize,
    pub bollinger_nbdev: f64,
    /// MACD fast period
    pub macd_timeperiod: usize,
    pub macd_slowperiod: usize,
    pub macd_signalperiod: usize,
    pub ema_fast_timeperiod: usize,
    pub ema_slow_timeperiod: usize,
    /// Long-horizon simple averages for golden/death cross
    pub ma_fast_timeperiod: usize,
    pub ma_slow_timeperiod: usize,
    pub stoch_fastk_period: usize,
    pub stoch_slowk_period: usize,
    pub stoch_slowd_period: usize,
    pub stoch_rsi_timeperiod: usize,
    pub stoch_rsi_fastk_period: usize,
    pub stoch_rsi_fastd_period: usize,
    pub psar_acceleration: f64,
    pub psar_maximum: f64,
    pub rsi_buy_value: f64,
    pub rsi_sell_value: f64,
    pub cci_buy_value: f64,
    pub cci_sell_value: f64,
    pub mfi_buy_value: f64,
    pub mfi_sell_value: f64,
    pub stoch_buy_value: f64,
    pub stoch_sell_value: f64,
    pub adx_strong_trend: f64,
    pub adx_weak_trend: f64,
    pub adx_no_trend: f64,
    /// Row offset for lag features
    pub lag_period: usize,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            general_timeperiod: 14,
            oscillator_periods: vec![14],
            average_periods: vec![5, 14, 28],
            bollinger_timeperiod: 20,
            bollinger_nbdev: 2.0,
            macd_timeperiod: 12,
            macd_slowperiod: 26,
            macd_signalperiod: 9,
            ema_fast_timeperiod: 9,
            ema_slow_timeperiod: 21,
            ma_fast_timeperiod: 50,
            ma_slow_timeperiod: 200,
            stoch_fastk_period: 14,
            stoch_slowk_period: 3,
            stoch_slowd_period: 3,
            stoch_rsi_timeperiod: 14,
            stoch_rsi_fastk_period: 3,
            stoch_rsi_fastd_period: 3,
            psar_acceleration: 0.02,
            psar_maximum: 0.2,
            rsi_buy_value: 30.0,
            rsi_sell_value: 70.0,
            cci_buy_value: -100.0,
            cci_sell_value: 100.0,
            mfi_buy_value: 30.0,
            mfi_sell_value: 70.0,
            stoch_buy_value: 20.0,
            stoch_sell_value: 80.0,
            adx_strong_trend: 25.0,
            adx_weak_trend: 20.0,
            adx_no_trend: 5.0,
            lag_period: 1,
        }
    }
}

impl IndicatorSettings {
    /// Oscillator periods with `general_timeperiod` merged in, sorted and unique.
    pub fn oscillator_periods(&self) -> Vec<usize> {
        let mut periods = self.oscillator_periods.clone();
        periods.push(self.general_timeperiod);
        periods.sort_unstable();
        periods.dedup();
        periods
    }

    /// All scalar lookbacks, for validation.
    pub(crate) fn lookbacks(&self) -> [(&'static str, usize); 15] {
        [
            ("general_timeperiod", self.general_timeperiod),
            ("bollinger_timeperiod", self.bollinger_timeperiod),
            ("macd_timeperiod", self.macd_timeperiod),
            ("macd_slowperiod", self.macd_slowperiod),
            ("macd_signalperiod", self.macd_signalperiod),
            ("ema_fast_timeperiod", self.ema_fast_timeperiod),
            ("ema_slow_timeperiod", self.ema_slow_timeperiod),
            ("ma_fast_timeperiod", self.ma_fast_timeperiod),
            ("ma_slow_timeperiod", self.ma_slow_timeperiod),
            ("stoch_fastk_period", self.stoch_fastk_period),
            ("stoch_slowk_period", self.stoch_slowk_period),
            ("stoch_slowd_period", self.stoch_slowd_period),
            ("stoch_rsi_timeperiod", self.stoch_rsi_timeperiod),
            ("stoch_rsi_fastk_period", self.stoch_rsi_fastk_period),
            ("stoch_rsi_fastd_period", self.stoch_rsi_fastd_period),
        ]
    }
}

/// Supervised target settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelSettings {
    /// Forward horizon in rows
    pub marker_periods: usize,
    /// Minimum forward gain (percent) for a successful trade
    pub success_threshold: f64,
    /// Stop level (percent, negative) the forward low must stay above
    pub drop_threshold: f64,
    pub regression: bool,
    pub classification: bool,
    /// Explicit label column name; derived from the mode flags when unset
    pub result_marker: Option<String>,
}

impl Default for LabelSettings {
    fn default() -> Self {
        Self {
            marker_periods: 14,
            success_threshold: 5.0,
            drop_threshold: -2.0,
            regression: false,
            classification: true,
            result_marker: None,
        }
    }
}

impl LabelSettings {
    /// Name of the column the model is trained against.
    pub fn label_column(&self) -> Option<String> {
        if let Some(marker) = &self.result_marker {
            return Some(marker.clone());
        }
        if self.classification {
            Some(classification_column(self.marker_periods))
        } else if self.regression {
            Some(regression_column(self.marker_periods))
        } else {
            None
        }
    }
}

/// Reduction, windowing and model consumer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceSettings {
    /// Number of projected components
    pub n_components: usize,
    /// Rows per window
    pub window_size: usize,
    /// Rows between a window's end and its label
    pub window_lookback: usize,
    pub test_size: f64,
    pub random_state: u64,
    pub n_trees: usize,
    pub max_depth: Option<u16>,
}

impl Default for SequenceSettings {
    fn default() -> Self {
        Self {
            n_components: 50,
            window_size: 30,
            window_lookback: 14,
            test_size: 0.2,
            random_state: 42,
            n_trees: 100,
            max_depth: None,
        }
    }
}

/// Exchange fetch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub base_url: String,
    pub symbol: String,
    pub interval: String,
    /// Recent window for inference fetches ("100d", "10h", "90m")
    pub lookback: String,
    /// Rows per page request
    pub page_limit: usize,
    /// Courtesy delay between pages in milliseconds
    pub page_delay_ms: u64,
    /// Attempts per request before giving up
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            symbol: "BTCUSDC".to_string(),
            interval: "1h".to_string(),
            lookback: "100d".to_string(),
            page_limit: 1000,
            page_delay_ms: 100,
            max_attempts: 5,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 30_000,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// Directory for CSV checkpoints and fitted artifacts
    pub data_dir: String,
    /// Optional plain-text log file in addition to stdout
    pub log_file: Option<String>,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            log_file: None,
        }
    }
}

/// One named step of a batch fetch job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchStep {
    pub name: String,
    pub symbol: String,
    pub interval: String,
    /// "1 Jan, 2020", "2020-01-01" or epoch millis
    pub start: String,
}
