//! Columnar feature table
//!
//! An ordered set of equally long named columns. Stages add, drop and replace
//! columns but never reorder rows.

mod csv_io;

pub use csv_io::{
    load_klines_csv, read_table_csv, save_klines_csv, write_table_csv, write_table_info,
};

use ndarray::Array2;
use std::collections::HashMap;

use crate::error::{PipelineError, Result};
use crate::features::FeatureKey;
use crate::types::{KlineSeries, KLINE_COLUMNS};

/// Storage for one column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Float(Vec<f64>),
    Bool(Vec<bool>),
    /// Epoch milliseconds
    Timestamp(Vec<i64>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Float(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::Timestamp(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `row` as f64 (booleans as 0/1).
    pub fn value(&self, row: usize) -> f64 {
        match self {
            ColumnData::Float(v) => v[row],
            ColumnData::Bool(v) => {
                if v[row] {
                    1.0
                } else {
                    0.0
                }
            }
            ColumnData::Timestamp(v) => v[row] as f64,
        }
    }

    pub fn to_f64(&self) -> Vec<f64> {
        (0..self.len()).map(|i| self.value(i)).collect()
    }

    pub fn as_float(&self) -> Option<&[f64]> {
        match self {
            ColumnData::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<&[bool]> {
        match self {
            ColumnData::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&[i64]> {
        match self {
            ColumnData::Timestamp(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    names: Vec<String>,
    columns: Vec<ColumnData>,
    index: HashMap<String, usize>,
    rows: usize,
}

impl FeatureTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows
    }

    /// True when the table has no rows or no columns
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.columns.is_empty()
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ColumnData> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnData)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.columns.iter())
    }

    /// Float column by name, or `MissingColumn`.
    pub fn float(&self, name: &str) -> Result<&[f64]> {
        match self.get(name) {
            Some(ColumnData::Float(v)) => Ok(v),
            Some(_) => Err(PipelineError::Config(format!(
                "column '{}' is not a float column",
                name
            ))),
            None => Err(PipelineError::MissingColumn(name.to_string())),
        }
    }

    pub fn timestamps(&self, name: &str) -> Result<&[i64]> {
        match self.get(name) {
            Some(ColumnData::Timestamp(v)) => Ok(v),
            Some(_) => Err(PipelineError::Config(format!(
                "column '{}' is not a timestamp column",
                name
            ))),
            None => Err(PipelineError::MissingColumn(name.to_string())),
        }
    }

    /// Any column as f64 values, or `MissingColumn`.
    pub fn numeric(&self, name: &str) -> Result<Vec<f64>> {
        self.get(name)
            .map(ColumnData::to_f64)
            .ok_or_else(|| PipelineError::MissingColumn(name.to_string()))
    }

    /// Insert or replace a column. The first column fixes the row count.
    pub fn insert(&mut self, name: impl Into<String>, data: ColumnData) -> Result<()> {
        let name = name.into();
        if self.columns.is_empty() {
            self.rows = data.len();
        } else if data.len() != self.rows {
            return Err(PipelineError::LengthMismatch {
                column: name,
                expected: self.rows,
                found: data.len(),
            });
        }

        match self.index.get(&name) {
            Some(&i) => self.columns[i] = data,
            None => {
                self.index.insert(name.clone(), self.columns.len());
                self.names.push(name);
                self.columns.push(data);
            }
        }
        Ok(())
    }

    pub fn insert_float(&mut self, key: &FeatureKey, values: Vec<f64>) -> Result<()> {
        self.insert(key.to_string(), ColumnData::Float(values))
    }

    pub fn insert_bool(&mut self, key: &FeatureKey, values: Vec<bool>) -> Result<()> {
        self.insert(key.to_string(), ColumnData::Bool(values))
    }

    pub fn remove(&mut self, name: &str) -> Option<ColumnData> {
        let idx = self.index.remove(name)?;
        self.names.remove(idx);
        let data = self.columns.remove(idx);
        for (i, n) in self.names.iter().enumerate().skip(idx) {
            self.index.insert(n.clone(), i);
        }
        Some(data)
    }

    /// Drop every listed column that exists; returns the names actually dropped.
    pub fn drop_columns(&mut self, names: &[&str]) -> Vec<String> {
        names
            .iter()
            .filter_map(|name| self.remove(name).map(|_| name.to_string()))
            .collect()
    }

    /// Replace each column with the result of `f`.
    pub fn map_columns<F>(self, mut f: F) -> Self
    where
        F: FnMut(&str, ColumnData) -> ColumnData,
    {
        let Self {
            names,
            columns,
            index,
            rows,
        } = self;
        let columns = names
            .iter()
            .zip(columns)
            .map(|(name, data)| f(name, data))
            .collect();
        Self {
            names,
            columns,
            index,
            rows,
        }
    }

    /// Values of one row in column order, as f64.
    pub fn row(&self, row: usize) -> Vec<f64> {
        self.columns.iter().map(|c| c.value(row)).collect()
    }

    /// Dense row-major matrix of the named columns.
    pub fn to_matrix(&self, columns: &[String]) -> Result<Array2<f64>> {
        let data: Vec<Vec<f64>> = columns
            .iter()
            .map(|name| self.numeric(name))
            .collect::<Result<_>>()?;
        Ok(Array2::from_shape_fn((self.rows, columns.len()), |(r, c)| {
            data[c][r]
        }))
    }

    /// The 12 raw kline columns: times as timestamps, everything else as floats.
    pub fn from_series(series: &KlineSeries) -> Result<Self> {
        let mut table = Self::new();
        for name in KLINE_COLUMNS {
            let klines = series.klines.iter();
            let data = match name {
                "open_time" => ColumnData::Timestamp(klines.map(|k| k.open_time).collect()),
                "close_time" => ColumnData::Timestamp(klines.map(|k| k.close_time).collect()),
                _ => ColumnData::Float(
                    klines
                        .map(|k| match name {
                            "open" => k.open,
                            "high" => k.high,
                            "low" => k.low,
                            "close" => k.close,
                            "volume" => k.volume,
                            "quote_asset_volume" => k.quote_asset_volume,
                            "number_of_trades" => k.number_of_trades as f64,
                            "taker_buy_base_asset_volume" => k.taker_buy_base_asset_volume,
                            "taker_buy_quote_asset_volume" => k.taker_buy_quote_asset_volume,
                            _ => k.ignore,
                        })
                        .collect(),
                ),
            };
            table.insert(name, data)?;
        }
        Ok(table)
    }

    /// Build a float table from a matrix, one column per name.
    pub fn from_matrix(names: &[String], matrix: &Array2<f64>) -> Result<Self> {
        if names.len() != matrix.ncols() {
            return Err(PipelineError::LengthMismatch {
                column: "<matrix columns>".into(),
                expected: matrix.ncols(),
                found: names.len(),
            });
        }
        let mut table = Self::new();
        for (c, name) in names.iter().enumerate() {
            table.insert(name.clone(), ColumnData::Float(matrix.column(c).to_vec()))?;
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FeatureTable {
        let mut t = FeatureTable::new();
        t.insert("a", ColumnData::Float(vec![1.0, 2.0, 3.0])).unwrap();
        t.insert("b", ColumnData::Bool(vec![true, false, true]))
            .unwrap();
        t.insert("c", ColumnData::Timestamp(vec![10, 20, 30]))
            .unwrap();
        t
    }

    #[test]
    fn test_insert_and_lookup() {
        let t = sample();
        assert_eq!(t.len(), 3);
        assert_eq!(t.width(), 3);
        assert_eq!(t.float("a").unwrap(), &[1.0, 2.0, 3.0]);
        assert_eq!(t.numeric("b").unwrap(), vec![1.0, 0.0, 1.0]);
        assert!(matches!(
            t.float("missing"),
            Err(PipelineError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_insert_rejects_wrong_length() {
        let mut t = sample();
        let err = t.insert("d", ColumnData::Float(vec![1.0])).unwrap_err();
        assert!(matches!(err, PipelineError::LengthMismatch { .. }));
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut t = sample();
        t.insert("a", ColumnData::Float(vec![9.0, 9.0, 9.0])).unwrap();
        assert_eq!(t.column_names(), &["a", "b", "c"]);
        assert_eq!(t.float("a").unwrap()[0], 9.0);
    }

    #[test]
    fn test_remove_reindexes() {
        let mut t = sample();
        let dropped = t.drop_columns(&["a", "zzz"]);
        assert_eq!(dropped, vec!["a".to_string()]);
        assert_eq!(t.column_names(), &["b", "c"]);
        assert_eq!(t.numeric("c").unwrap(), vec![10.0, 20.0, 30.0]);
        assert_eq!(t.row(1), vec![0.0, 20.0]);
    }

    #[test]
    fn test_matrix_round_trip() {
        let t = sample();
        let names: Vec<String> = vec!["a".into(), "c".into()];
        let m = t.to_matrix(&names).unwrap();
        assert_eq!(m.shape(), &[3, 2]);
        assert_eq!(m[[2, 1]], 30.0);

        let back = FeatureTable::from_matrix(&names, &m).unwrap();
        assert_eq!(back.float("c").unwrap(), &[10.0, 20.0, 30.0]);
    }
}
