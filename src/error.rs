//! Error types for the kline pipeline
//!
//! Every stage returns `Result<_, PipelineError>`. Callers match on
//! [`PipelineError::kind`] to decide whether to abort, skip or retry.

use thiserror::Error;

/// Broad classes of failure a stage can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad settings, unsupported interval, missing column. Fatal to the current stage.
    Configuration,
    /// Network, rate-limit or timeout failures that survived the retry budget.
    Transient,
    /// Degenerate data that could not be replaced by a sentinel.
    DataQuality,
    /// Local filesystem / serialization failures.
    Io,
}

/// Errors reported by a kline source (exchange REST endpoint).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("rate limited by exchange (status {status})")]
    RateLimited { status: u16 },

    #[error("exchange API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("request timed out")]
    Timeout,

    #[error("malformed kline response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SourceError::Timeout
        } else if e.is_decode() {
            SourceError::Malformed(e.to_string())
        } else {
            SourceError::Connection(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unsupported interval '{0}' (expected 15m, 30m or 1h)")]
    UnsupportedInterval(String),

    #[error("invalid start '{0}' (expected '1 Jan, 2020', '2020-01-01' or epoch millis)")]
    InvalidStart(String),

    #[error("column '{0}' not found in table")]
    MissingColumn(String),

    #[error("{0}: table is empty")]
    EmptyTable(&'static str),

    #[error("column '{column}' has {found} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("dimensionality reduction failed: {0}")]
    Reduction(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("fetch of {symbol} failed after {attempts} attempts: {source}")]
    Fetch {
        symbol: String,
        attempts: u32,
        #[source]
        source: SourceError,
    },

    #[error("no klines available for {symbol} {interval}")]
    NoData { symbol: String, interval: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("settings error: {0}")]
    Settings(#[from] config::ConfigError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Config(_)
            | PipelineError::UnsupportedInterval(_)
            | PipelineError::InvalidStart(_)
            | PipelineError::MissingColumn(_)
            | PipelineError::EmptyTable(_)
            | PipelineError::LengthMismatch { .. }
            | PipelineError::Settings(_) => ErrorKind::Configuration,
            PipelineError::Fetch { .. } | PipelineError::NoData { .. } => ErrorKind::Transient,
            PipelineError::Reduction(_) | PipelineError::Model(_) => ErrorKind::DataQuality,
            PipelineError::Io(_) | PipelineError::Csv(_) | PipelineError::Json(_) => ErrorKind::Io,
        }
    }

    /// Whether a batch driver may log this failure and move on to the next step.
    pub fn is_skippable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_follow_taxonomy() {
        assert_eq!(
            PipelineError::UnsupportedInterval("4h".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            PipelineError::MissingColumn("close".into()).kind(),
            ErrorKind::Configuration
        );
        let fetch = PipelineError::Fetch {
            symbol: "BTCUSDC".into(),
            attempts: 3,
            source: SourceError::Timeout,
        };
        assert_eq!(fetch.kind(), ErrorKind::Transient);
        assert!(fetch.is_skippable());
        assert!(!PipelineError::EmptyTable("normalize").is_skippable());
    }

    #[test]
    fn test_fetch_error_message_mentions_attempts() {
        let err = PipelineError::Fetch {
            symbol: "ETHUSDC".into(),
            attempts: 5,
            source: SourceError::RateLimited { status: 429 },
        };
        let msg = err.to_string();
        assert!(msg.contains("ETHUSDC"));
        assert!(msg.contains("5 attempts"));
    }
}
