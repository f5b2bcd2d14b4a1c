//! Sliding-window tensors for sequence models

use ndarray::{s, Array1, Array3};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::table::FeatureTable;
use crate::types::RunMode;

/// `(n, window, features)` windows plus, in training, one label per window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequences {
    pub windows: Array3<f64>,
    pub labels: Option<Array1<f64>>,
}

impl Sequences {
    pub fn len(&self) -> usize {
        self.windows.dim().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn window_size(&self) -> usize {
        self.windows.dim().1
    }

    pub fn feature_width(&self) -> usize {
        self.windows.dim().2
    }

    /// Window `i` flattened row by row
    pub fn flat_window(&self, i: usize) -> Vec<f64> {
        self.windows.slice(s![i, .., ..]).iter().copied().collect()
    }

    /// Subset by window index, keeping labels aligned
    pub fn select(&self, indices: &[usize]) -> Self {
        let windows = self.windows.select(ndarray::Axis(0), indices);
        let labels = self
            .labels
            .as_ref()
            .map(|l| Array1::from_iter(indices.iter().map(|&i| l[i])));
        Self { windows, labels }
    }
}

/// Build windows of `window_size` rows.
///
/// Both modes emit one window per row `i` in `window_size..len - horizon`,
/// covering rows `[i - window_size, i)`. Training labels each window with
/// `label[i + horizon]`; inference leaves labels out.
pub fn build_sequences(
    table: &FeatureTable,
    window_size: usize,
    horizon: usize,
    label_column: Option<&str>,
    mode: RunMode,
) -> Result<Sequences> {
    if window_size == 0 {
        return Err(PipelineError::Config("window_size must be > 0".to_string()));
    }
    if table.is_empty() {
        return Err(PipelineError::EmptyTable("build_sequences"));
    }

    let feature_columns: Vec<String> = table
        .column_names()
        .iter()
        .filter(|name| Some(name.as_str()) != label_column)
        .cloned()
        .collect();
    let matrix = table.to_matrix(&feature_columns)?;
    let len = table.len();
    let width = feature_columns.len();

    let ends: Vec<usize> = (window_size..len.saturating_sub(horizon)).collect();
    let labels = match mode {
        RunMode::Training => {
            let label = label_column.ok_or_else(|| {
                PipelineError::Config("training sequences need a label column".to_string())
            })?;
            let values = table.numeric(label)?;
            Some(ends.iter().map(|&i| values[i + horizon]).collect::<Vec<f64>>())
        }
        RunMode::Inference => None,
    };

    if ends.is_empty() {
        warn!(
            "Not enough rows for sequences: {} rows, window {}, horizon {}",
            len, window_size, horizon
        );
    }

    let mut windows = Array3::<f64>::zeros((ends.len(), window_size, width));
    for (n, &end) in ends.iter().enumerate() {
        windows
            .slice_mut(s![n, .., ..])
            .assign(&matrix.slice(s![end - window_size..end, ..]));
    }

    debug!(
        "Built {} {} sequences of shape ({}, {})",
        ends.len(),
        mode,
        window_size,
        width
    );
    Ok(Sequences {
        windows,
        labels: labels.map(Array1::from_vec),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnData;

    fn table(rows: usize) -> FeatureTable {
        let mut t = FeatureTable::new();
        t.insert("f", ColumnData::Float((0..rows).map(|i| i as f64).collect()))
            .unwrap();
        t.insert(
            "label",
            ColumnData::Float((0..rows).map(|i| 100.0 + i as f64).collect()),
        )
        .unwrap();
        t
    }

    #[test]
    fn test_training_count_and_alignment() {
        let seq = build_sequences(&table(10), 3, 2, Some("label"), RunMode::Training).unwrap();
        // i in 3..8
        assert_eq!(seq.len(), 5);
        assert_eq!(seq.feature_width(), 1);
        assert_eq!(seq.flat_window(0), vec![0.0, 1.0, 2.0]);
        let labels = seq.labels.unwrap();
        assert_eq!(labels[0], 105.0);
        assert_eq!(labels[4], 109.0);
    }

    #[test]
    fn test_training_too_short_is_empty() {
        let seq = build_sequences(&table(4), 3, 2, Some("label"), RunMode::Training).unwrap();
        assert!(seq.is_empty());
        assert_eq!(seq.windows.dim(), (0, 3, 1));
    }

    #[test]
    fn test_inference_uses_training_window_ends() {
        let training = build_sequences(&table(10), 3, 2, Some("label"), RunMode::Training).unwrap();
        let inference = build_sequences(&table(10), 3, 2, Some("label"), RunMode::Inference).unwrap();
        assert!(inference.labels.is_none());
        assert_eq!(inference.windows, training.windows);
        // last window ends right before row len - horizon
        assert_eq!(inference.flat_window(4), vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_inference_too_short_is_empty() {
        let seq = build_sequences(&table(5), 3, 2, None, RunMode::Inference).unwrap();
        assert!(seq.is_empty());
    }

    #[test]
    fn test_errors() {
        let t = table(5);
        assert!(matches!(
            build_sequences(&t, 0, 1, Some("label"), RunMode::Training),
            Err(PipelineError::Config(_))
        ));
        assert!(matches!(
            build_sequences(&t, 2, 1, None, RunMode::Training),
            Err(PipelineError::Config(_))
        ));
        assert!(matches!(
            build_sequences(&t, 2, 1, Some("missing"), RunMode::Training),
            Err(PipelineError::MissingColumn(_))
        ));
    }
}
