//! Stage orchestration
//!
//! `prepare_features` runs the per-series stages (indicators, labels,
//! cleanup). `FittedPipeline` owns the stateful stages, scaler and PCA basis,
//! so the exact transform fitted on training data is replayed at inference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::cleaning::{finalize_columns, DEFAULT_DROP_COLUMNS};
use crate::config::Settings;
use crate::error::{PipelineError, Result};
use crate::features::IndicatorEngine;
use crate::labeling::{
    add_labels, classification_column, regression_column, LabelModes, LabelThresholds,
};
use crate::normalize::MinMaxScaler;
use crate::reduce::{attach_label, PcaReducer};
use crate::sequence::{build_sequences, Sequences};
use crate::table::FeatureTable;
use crate::types::{KlineSeries, RunMode};

/// Indicators, then labels (training only), then column cleanup
pub fn prepare_features(series: &KlineSeries, settings: &Settings, mode: RunMode) -> Result<FeatureTable> {
    finalize_columns(compute_features(series, settings, mode)?, &DEFAULT_DROP_COLUMNS)
}

/// Indicators plus, in training, the label columns. Raw columns are kept.
pub fn compute_features(series: &KlineSeries, settings: &Settings, mode: RunMode) -> Result<FeatureTable> {
    let engine = IndicatorEngine::new(settings.indicators.clone());
    let mut table = engine.compute(series)?;

    if mode.is_training() {
        let lab = &settings.labeling;
        let modes = LabelModes {
            regression: lab.regression,
            classification: lab.classification,
        };
        if modes.regression || modes.classification {
            add_labels(
                &mut table,
                lab.marker_periods,
                modes,
                LabelThresholds {
                    success: lab.success_threshold,
                    drop: lab.drop_threshold,
                },
            )?;
        } else {
            warn!("No label mode enabled, expecting '{:?}' to be present", lab.result_marker);
        }
    }
    Ok(table)
}

/// Copy of `prepared` without the generated label columns other than `label`
fn without_other_labels(prepared: &FeatureTable, label: &str, marker_periods: usize) -> FeatureTable {
    let mut features = prepared.clone();
    for other in [classification_column(marker_periods), regression_column(marker_periods)] {
        if other != label && features.remove(&other).is_some() {
            debug!("Excluded label column '{}' from features", other);
        }
    }
    features
}

/// Training windows whose label row `i + horizon` is one of the last
/// `marker_periods` rows, which the labeler cannot fill
fn unfilled_label_count(len: usize, window_size: usize, horizon: usize, marker_periods: usize) -> usize {
    let first_label_row = (window_size + horizon).max(len.saturating_sub(marker_periods));
    len.saturating_sub(first_label_row)
}

/// Fitted scaler and PCA basis plus the windowing parameters they were fitted with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPipeline {
    pub version: String,
    pub label_column: String,
    pub scaler: MinMaxScaler,
    pub reducer: PcaReducer,
    pub window_size: usize,
    pub horizon: usize,
    pub fitted_at: DateTime<Utc>,
}

impl FittedPipeline {
    /// Fit scaler and PCA on a prepared training table and build its sequences
    pub fn fit(prepared: &FeatureTable, settings: &Settings) -> Result<(Self, Sequences)> {
        let label = settings
            .label_column()
            .ok_or_else(|| PipelineError::Config("training needs a label column".to_string()))?;
        let seq = &settings.sequence;
        let marker_periods = settings.labeling.marker_periods;

        let features = without_other_labels(prepared, &label, marker_periods);
        let scaler = MinMaxScaler::fit(&features, Some(&label))?;
        let normalized = scaler.transform(&features)?;

        let reducer = PcaReducer::fit(&normalized, seq.n_components, Some(&label))?;
        let mut reduced = reducer.transform(&normalized)?;
        attach_label(&mut reduced, prepared, &label)?;

        let sequences = build_sequences(
            &reduced,
            seq.window_size,
            seq.window_lookback,
            Some(&label),
            RunMode::Training,
        )?;
        debug!(
            "{} of {} training labels read zero-filled rows without a full forward horizon",
            unfilled_label_count(prepared.len(), seq.window_size, seq.window_lookback, marker_periods),
            sequences.len()
        );
        info!(
            "✅ Pipeline fitted: {} sequences of ({}, {})",
            sequences.len(),
            sequences.window_size(),
            sequences.feature_width()
        );

        let fitted = Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            label_column: label,
            scaler,
            reducer,
            window_size: seq.window_size,
            horizon: seq.window_lookback,
            fitted_at: Utc::now(),
        };
        Ok((fitted, sequences))
    }

    /// Replay the fitted transform on a prepared inference table
    pub fn transform(&self, prepared: &FeatureTable) -> Result<Sequences> {
        let normalized = self.scaler.transform(prepared)?;
        let reduced = self.reducer.transform(&normalized)?;
        build_sequences(
            &reduced,
            self.window_size,
            self.horizon,
            None,
            RunMode::Inference,
        )
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        info!("💾 Pipeline state saved to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let fitted: Self = serde_json::from_reader(reader)?;
        info!(
            "📂 Pipeline state loaded from {} (fitted {})",
            path.display(),
            fitted.fitted_at
        );
        Ok(fitted)
    }
}
