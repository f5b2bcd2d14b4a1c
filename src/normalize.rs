//! Min-max scaling
//!
//! The scaler is fitted once on training data and persisted; inference
//! reuses the fitted ranges instead of refitting on the live window.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::table::{ColumnData, FeatureTable};

/// Magnitude cap applied before scaling
pub const CLIP_BOUND: f64 = 1e300;

/// NaN and infinities become 0, everything else is clipped to ±CLIP_BOUND
pub fn sanitize(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(-CLIP_BOUND, CLIP_BOUND)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRange {
    pub name: String,
    pub min: f64,
    pub max: f64,
}

impl ColumnRange {
    fn scale(&self, v: f64) -> f64 {
        let range = self.max - self.min;
        if range > 0.0 {
            ((sanitize(v) - self.min) / range).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub columns: Vec<ColumnRange>,
    /// Column passed through unscaled
    pub label: Option<String>,
}

impl MinMaxScaler {
    pub fn fit(table: &FeatureTable, exclude_column: Option<&str>) -> Result<Self> {
        if table.is_empty() {
            return Err(PipelineError::EmptyTable("normalize"));
        }
        if let Some(label) = exclude_column {
            if !table.contains(label) {
                return Err(PipelineError::MissingColumn(label.to_string()));
            }
        }

        let mut columns = Vec::with_capacity(table.width());
        for (name, data) in table.iter() {
            if Some(name) == exclude_column {
                continue;
            }
            let (min, max) = data
                .to_f64()
                .into_iter()
                .map(sanitize)
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                });
            columns.push(ColumnRange {
                name: name.to_string(),
                min,
                max,
            });
        }

        let constant = columns.iter().filter(|c| c.max <= c.min).count();
        debug!(
            "Scaler fitted on {} columns ({} constant)",
            columns.len(),
            constant
        );
        Ok(Self {
            columns,
            label: exclude_column.map(str::to_string),
        })
    }

    /// Scale the fitted columns; the label, when present, is appended last unchanged
    pub fn transform(&self, table: &FeatureTable) -> Result<FeatureTable> {
        if table.is_empty() {
            return Err(PipelineError::EmptyTable("normalize"));
        }

        let mut out = FeatureTable::new();
        for range in &self.columns {
            let values = table
                .numeric(&range.name)?
                .into_iter()
                .map(|v| range.scale(v))
                .collect();
            out.insert(range.name.clone(), ColumnData::Float(values))?;
        }
        if let Some(label) = &self.label {
            if let Some(data) = table.get(label) {
                out.insert(label.clone(), data.clone())?;
            }
        }
        Ok(out)
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Fit a scaler on `table` and apply it
pub fn normalize(table: &FeatureTable, exclude_column: Option<&str>) -> Result<FeatureTable> {
    MinMaxScaler::fit(table, exclude_column)?.transform(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FeatureTable {
        let mut t = FeatureTable::new();
        t.insert("a", ColumnData::Float(vec![2.0, 4.0, 6.0]))
            .unwrap();
        t.insert("flat", ColumnData::Float(vec![3.0, 3.0, 3.0]))
            .unwrap();
        t.insert("wild", ColumnData::Float(vec![f64::NAN, f64::INFINITY, -1.0]))
            .unwrap();
        t.insert("label", ColumnData::Float(vec![1.0, 0.0, 1.0]))
            .unwrap();
        t
    }

    #[test]
    fn test_columns_scaled_to_unit_range() {
        let out = normalize(&sample(), Some("label")).unwrap();
        assert_eq!(out.float("a").unwrap(), &[0.0, 0.5, 1.0]);
        assert_eq!(out.float("flat").unwrap(), &[0.0, 0.0, 0.0]);
        // NaN and inf sanitize to 0 before fitting
        assert_eq!(out.float("wild").unwrap(), &[1.0, 1.0, 0.0]);
        assert_eq!(out.column_names().last().map(String::as_str), Some("label"));
        assert_eq!(out.float("label").unwrap(), &[1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_inference_reuses_fit_and_clamps() {
        let scaler = MinMaxScaler::fit(&sample(), Some("label")).unwrap();
        let mut live = FeatureTable::new();
        live.insert("a", ColumnData::Float(vec![0.0, 5.0, 9.0]))
            .unwrap();
        live.insert("flat", ColumnData::Float(vec![1.0, 1.0, 1.0]))
            .unwrap();
        live.insert("wild", ColumnData::Float(vec![0.0, 0.0, 0.0]))
            .unwrap();

        let out = scaler.transform(&live).unwrap();
        assert_eq!(out.float("a").unwrap(), &[0.0, 0.75, 1.0]);
        assert!(!out.contains("label"));
    }

    #[test]
    fn test_missing_columns() {
        let err = normalize(&sample(), Some("nope")).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn(_)));

        let scaler = MinMaxScaler::fit(&sample(), None).unwrap();
        let mut live = FeatureTable::new();
        live.insert("a", ColumnData::Float(vec![1.0])).unwrap();
        assert!(matches!(
            scaler.transform(&live),
            Err(PipelineError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_empty_table_rejected() {
        assert!(matches!(
            normalize(&FeatureTable::new(), None),
            Err(PipelineError::EmptyTable(_))
        ));

        let mut no_rows = FeatureTable::new();
        no_rows.insert("a", ColumnData::Float(Vec::new())).unwrap();
        assert!(matches!(
            MinMaxScaler::fit(&no_rows, None),
            Err(PipelineError::EmptyTable(_))
        ));
    }

    #[test]
    fn test_scaler_serde() {
        let scaler = MinMaxScaler::fit(&sample(), Some("label")).unwrap();
        let json = serde_json::to_string(&scaler).unwrap();
        let back: MinMaxScaler = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scaler);
    }
}
