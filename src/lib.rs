//! KlineForge Library
//!
//! Feature engineering for crypto klines: paginated history fetch, technical
//! indicators, forward labels, scaling, PCA and sliding-window sequences.

pub mod cleaning;
pub mod config;
pub mod error;
pub mod features;
pub mod fetch;
pub mod labeling;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod reduce;
pub mod sequence;
pub mod table;
pub mod types;

pub use config::Settings;
pub use error::{ErrorKind, PipelineError, Result, SourceError};
pub use features::{compute_indicators, IndicatorEngine};
pub use fetch::{fetch_sequence, BinanceKlineClient, HistoricalFetcher, KlineSource};
pub use pipeline::{compute_features, prepare_features, FittedPipeline};
pub use sequence::{build_sequences, Sequences};
pub use table::{ColumnData, FeatureTable};
pub use types::{Interval, Kline, KlineSeries, RunMode};
