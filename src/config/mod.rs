//! Configuration management for klineforge
//!
//! Loads built-in defaults, then an optional settings file (json/toml/yaml),
//! then `KLINEFORGE__*` environment overrides.

mod types;

pub use types::*;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::fetch::parse_lookback;
use crate::types::Interval;

/// Main pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub indicators: IndicatorSettings,
    pub labeling: LabelSettings,
    pub sequence: SequenceSettings,
    pub fetch: FetchSettings,
    pub data: DataSettings,
    /// Batch fetch job (see `fetch::fetch_sequence`)
    pub fetch_sequence: Vec<FetchStep>,
}

impl Settings {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let mut builder = Config::builder().add_source(Config::try_from(&Settings::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config = builder
            // Override with environment variables (KLINEFORGE__SEQUENCE__WINDOW_SIZE=60)
            .add_source(Environment::with_prefix("KLINEFORGE").separator("__"))
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;

        tracing::info!(settings = %settings, "⚙️ Settings loaded");
        Ok(settings)
    }

    /// Reject settings no stage could run with
    pub fn validate(&self) -> Result<()> {
        let ind = &self.indicators;
        for (name, value) in ind.lookbacks() {
            if value == 0 {
                return Err(PipelineError::Config(format!("{} must be positive", name)));
            }
        }
        if ind.average_periods.is_empty() || ind.average_periods.contains(&0) {
            return Err(PipelineError::Config(
                "average_periods must be a non-empty list of positive periods".into(),
            ));
        }
        if ind.oscillator_periods.contains(&0) {
            return Err(PipelineError::Config(
                "oscillator_periods must be positive".into(),
            ));
        }
        if ind.macd_timeperiod >= ind.macd_slowperiod {
            return Err(PipelineError::Config(format!(
                "macd_timeperiod ({}) must be below macd_slowperiod ({})",
                ind.macd_timeperiod, ind.macd_slowperiod
            )));
        }
        if ind.bollinger_nbdev <= 0.0 || !ind.bollinger_nbdev.is_finite() {
            return Err(PipelineError::Config("bollinger_nbdev must be positive".into()));
        }
        if ind.psar_acceleration <= 0.0 || ind.psar_maximum < ind.psar_acceleration {
            return Err(PipelineError::Config(
                "psar_acceleration must be positive and not exceed psar_maximum".into(),
            ));
        }

        let lab = &self.labeling;
        if lab.marker_periods == 0 {
            return Err(PipelineError::Config("marker_periods must be positive".into()));
        }
        if !lab.regression && !lab.classification && lab.result_marker.is_none() {
            return Err(PipelineError::Config(
                "one of labeling.regression / labeling.classification must be enabled".into(),
            ));
        }

        let seq = &self.sequence;
        if seq.window_size == 0 {
            return Err(PipelineError::Config("window_size must be positive".into()));
        }
        if seq.n_components == 0 {
            return Err(PipelineError::Config("n_components must be positive".into()));
        }
        if !(seq.test_size > 0.0 && seq.test_size < 1.0) {
            return Err(PipelineError::Config(format!(
                "test_size must be in (0, 1), got {}",
                seq.test_size
            )));
        }

        if self.fetch.page_limit == 0 || self.fetch.max_attempts == 0 {
            return Err(PipelineError::Config(
                "page_limit and max_attempts must be positive".into(),
            ));
        }
        let interval = Interval::parse(&self.fetch.interval)?;
        let lookback_rows = (parse_lookback(&self.fetch.lookback)? / interval.duration_ms()) as usize;
        let needed = ind.ma_slow_timeperiod + seq.window_size + seq.window_lookback;
        if lookback_rows < needed {
            return Err(PipelineError::Config(format!(
                "lookback '{}' covers {} {} rows, inference needs at least {} (ma_slow_timeperiod + window_size + window_lookback)",
                self.fetch.lookback, lookback_rows, interval, needed
            )));
        }
        for step in &self.fetch_sequence {
            Interval::parse(&step.interval)?;
        }

        Ok(())
    }

    pub fn interval(&self) -> Result<Interval> {
        Interval::parse(&self.fetch.interval)
    }

    pub fn label_column(&self) -> Option<String> {
        self.labeling.label_column()
    }

    /// Generate a digest of the settings for logging
    pub fn digest(&self) -> String {
        format!(
            "symbol={} interval={} general={} marker={} window={} horizon={} components={} mode={}",
            self.fetch.symbol,
            self.fetch.interval,
            self.indicators.general_timeperiod,
            self.labeling.marker_periods,
            self.sequence.window_size,
            self.sequence.window_lookback,
            self.sequence.n_components,
            if self.labeling.classification {
                "classification"
            } else {
                "regression"
            }
        )
    }
}

impl std::fmt::Display for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
