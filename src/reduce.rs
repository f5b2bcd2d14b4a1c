//! PCA projection of the normalized feature table
//!
//! The decomposition itself is smartcore's. Only the means and the
//! component basis are kept, so a fitted reducer is plain serializable data
//! and inference projects with the training basis.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use smartcore::decomposition::pca::{PCAParameters, PCA};
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::table::{ColumnData, FeatureTable};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaReducer {
    pub feature_columns: Vec<String>,
    pub mean: Vec<f64>,
    /// k x n, one row per component
    pub components: Array2<f64>,
}

impl PcaReducer {
    /// Fit on every column except `exclude`
    pub fn fit(table: &FeatureTable, n_components: usize, exclude: Option<&str>) -> Result<Self> {
        if table.is_empty() {
            return Err(PipelineError::EmptyTable("reduce"));
        }
        let feature_columns: Vec<String> = table
            .column_names()
            .iter()
            .filter(|name| Some(name.as_str()) != exclude)
            .cloned()
            .collect();
        let n = feature_columns.len();
        if n_components == 0 || n_components > n {
            return Err(PipelineError::Reduction(format!(
                "n_components {} must be in 1..={} (feature width)",
                n_components, n
            )));
        }

        let x = table.to_matrix(&feature_columns)?;
        let mean = x
            .mean_axis(Axis(0))
            .map(|m| m.to_vec())
            .unwrap_or_else(|| vec![0.0; n]);

        let rows: Vec<Vec<f64>> = x.outer_iter().map(|r| r.to_vec()).collect();
        let dense = DenseMatrix::from_2d_vec(&rows)
            .map_err(|e| PipelineError::Reduction(e.to_string()))?;
        let params = PCAParameters::default().with_n_components(n_components);
        let pca: PCA<f64, DenseMatrix<f64>> =
            PCA::fit(&dense, params).map_err(|e| PipelineError::Reduction(e.to_string()))?;

        let components = basis_rows(pca.components(), n, n_components)?;
        info!(
            "📉 PCA fitted: {} features -> {} components on {} rows",
            n,
            n_components,
            table.len()
        );
        Ok(Self {
            feature_columns,
            mean,
            components,
        })
    }

    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    /// Project `table` onto the fitted basis; columns are named "0".."k-1"
    pub fn transform(&self, table: &FeatureTable) -> Result<FeatureTable> {
        if table.is_empty() {
            return Err(PipelineError::EmptyTable("reduce"));
        }
        let x = table.to_matrix(&self.feature_columns)?;
        let centered = x - &Array1::from_vec(self.mean.clone());
        let projected = centered.dot(&self.components.t());
        let names: Vec<String> = (0..self.n_components()).map(|i| i.to_string()).collect();
        debug!("Projected {} rows onto {} components", table.len(), names.len());
        FeatureTable::from_matrix(&names, &projected)
    }
}

/// Normalize smartcore's component matrix to k x n, whichever way it is laid out
fn basis_rows(components: &DenseMatrix<f64>, n: usize, k: usize) -> Result<Array2<f64>> {
    let (r, c) = components.shape();
    if c == n && r >= k {
        Ok(Array2::from_shape_fn((k, n), |(i, j)| *components.get((i, j))))
    } else if r == n && c >= k {
        Ok(Array2::from_shape_fn((k, n), |(i, j)| *components.get((j, i))))
    } else {
        Err(PipelineError::Reduction(format!(
            "unexpected component shape {}x{} for {} features",
            r, c, n
        )))
    }
}

/// Append `label_column` from `source` to `target` by row position
pub fn attach_label(target: &mut FeatureTable, source: &FeatureTable, label_column: &str) -> Result<()> {
    let Some(data) = source.get(label_column) else {
        return Ok(());
    };
    if data.len() != target.len() {
        return Err(PipelineError::LengthMismatch {
            column: label_column.to_string(),
            expected: target.len(),
            found: data.len(),
        });
    }
    target.insert(label_column, ColumnData::Float(data.to_f64()))
}

/// Fit a PCA on `normalized` and project it, reattaching the label when available
pub fn reduce(
    normalized: &FeatureTable,
    label_source: Option<&FeatureTable>,
    label_column: Option<&str>,
    n_components: usize,
) -> Result<FeatureTable> {
    let reducer = PcaReducer::fit(normalized, n_components, label_column)?;
    let mut out = reducer.transform(normalized)?;
    if let (Some(source), Some(label)) = (label_source, label_column) {
        attach_label(&mut out, source, label)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn correlated(rows: usize) -> FeatureTable {
        let mut t = FeatureTable::new();
        let a: Vec<f64> = (0..rows).map(|i| i as f64 / rows as f64).collect();
        let b: Vec<f64> = a.iter().map(|v| 2.0 * v + 0.1).collect();
        let c: Vec<f64> = (0..rows).map(|i| ((i * 7) % 5) as f64 / 5.0).collect();
        t.insert("a", ColumnData::Float(a)).unwrap();
        t.insert("b", ColumnData::Float(b)).unwrap();
        t.insert("c", ColumnData::Float(c)).unwrap();
        t.insert("label", ColumnData::Float(vec![1.0; rows])).unwrap();
        t
    }

    #[test]
    fn test_reduce_shape_and_label() {
        let t = correlated(20);
        let out = reduce(&t, Some(&t), Some("label"), 2).unwrap();
        assert_eq!(out.column_names(), &["0", "1", "label"]);
        assert_eq!(out.len(), 20);
        assert_eq!(out.float("label").unwrap(), &[1.0; 20][..]);
    }

    #[test]
    fn test_projection_is_centered() {
        let t = correlated(30);
        let reducer = PcaReducer::fit(&t, 2, Some("label")).unwrap();
        assert_eq!(reducer.components.dim(), (2, 3));
        let out = reducer.transform(&t).unwrap();
        for name in ["0", "1"] {
            let mean: f64 = out.float(name).unwrap().iter().sum::<f64>() / 30.0;
            assert!(mean.abs() < 1e-9, "component {} mean {}", name, mean);
        }
    }

    #[test]
    fn test_too_many_components() {
        let t = correlated(10);
        let err = reduce(&t, None, Some("label"), 4).unwrap_err();
        assert!(matches!(err, PipelineError::Reduction(_)));
    }

    #[test]
    fn test_empty_table_rejected() {
        assert!(matches!(
            reduce(&FeatureTable::new(), None, None, 1),
            Err(PipelineError::EmptyTable(_))
        ));

        let reducer = PcaReducer::fit(&correlated(10), 2, Some("label")).unwrap();
        assert!(matches!(
            reducer.transform(&FeatureTable::new()),
            Err(PipelineError::EmptyTable(_))
        ));
    }

    #[test]
    fn test_label_row_mismatch() {
        let t = correlated(10);
        let mut short = FeatureTable::new();
        short
            .insert("label", ColumnData::Float(vec![0.0; 9]))
            .unwrap();
        let err = reduce(&t, Some(&short), Some("label"), 2).unwrap_err();
        assert!(matches!(err, PipelineError::LengthMismatch { .. }));
    }
}
