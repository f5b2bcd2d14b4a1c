//! Forward-looking labels
//!
//! Labels look `marker_period` rows ahead of each row, so they only exist in
//! training mode and always leave a tail without a complete horizon.

use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::features::math::safe_pct;
use crate::table::{ColumnData, FeatureTable};

pub fn classification_column(marker_period: usize) -> String {
    format!("marker_close_trade_success_in_next_{}_periods", marker_period)
}

pub fn regression_column(marker_period: usize) -> String {
    format!("marker_close_pct_change_in_next_{}_periods", marker_period)
}

/// Which label columns to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelModes {
    pub regression: bool,
    pub classification: bool,
}

/// Percent thresholds for the trade-success label
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelThresholds {
    /// Minimum forward gain
    pub success: f64,
    /// Floor the forward low must stay at or above (negative)
    pub drop: f64,
}

/// Append the requested label columns to `table`
pub fn add_labels(
    table: &mut FeatureTable,
    marker_period: usize,
    modes: LabelModes,
    thresholds: LabelThresholds,
) -> Result<()> {
    if !modes.regression && !modes.classification {
        return Err(PipelineError::Config(
            "labeling needs regression or classification enabled".to_string(),
        ));
    }
    let close = table.float("close")?.to_vec();

    if modes.regression {
        let name = regression_column(marker_period);
        table.insert(
            name.clone(),
            ColumnData::Float(forward_pct_change(&close, marker_period)),
        )?;
        debug!("Added regression label {}", name);
    }

    if modes.classification {
        let name = classification_column(marker_period);
        let labels = trade_success(&close, marker_period, thresholds);
        let positives = labels.iter().filter(|&&b| b).count();
        table.insert(name.clone(), ColumnData::Bool(labels))?;
        info!(
            "🏷️ {}: {} positive of {} rows",
            name,
            positives,
            close.len()
        );
    }

    Ok(())
}

/// `(close[t+m] - close[t]) * 100 / close[t]`, NaN where the horizon runs past the end
pub fn forward_pct_change(close: &[f64], m: usize) -> Vec<f64> {
    (0..close.len())
        .map(|t| match close.get(t + m) {
            Some(&future) if m > 0 => safe_pct(future, close[t]),
            _ => f64::NAN,
        })
        .collect()
}

/// True when the best close over the next `m` rows reaches the success
/// threshold and the worst close never drops below the drop threshold.
/// A close exactly at the stop level does not stop the trade out.
pub fn trade_success(close: &[f64], m: usize, thresholds: LabelThresholds) -> Vec<bool> {
    (0..close.len())
        .map(|t| {
            if m == 0 || t + m >= close.len() {
                return false;
            }
            let future = &close[t + 1..=t + m];
            let max = future.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let min = future.iter().copied().fold(f64::INFINITY, f64::min);
            safe_pct(max, close[t]) >= thresholds.success
                && safe_pct(min, close[t]) >= thresholds.drop
        })
        .collect()
}
