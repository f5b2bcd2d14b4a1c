//! CSV checkpoints for kline series and feature tables
//!
//! Floats are written with Rust's shortest round-trip formatting so a table
//! read back is bit-identical to the one written.

use csv::{ReaderBuilder, WriterBuilder};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::info;

use super::{ColumnData, FeatureTable};
use crate::error::{PipelineError, Result};
use crate::types::{Interval, Kline, KlineSeries};

/// Columns read back as timestamps when every cell is an integer.
const TIMESTAMP_COLUMNS: [&str; 2] = ["open_time", "close_time"];

/// Rows shown at the bottom of a `.info` summary
const INFO_TAIL_ROWS: usize = 3;

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Save raw klines with the exchange's 12-column header
pub fn save_klines_csv(series: &KlineSeries, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = WriterBuilder::new().has_headers(true).from_path(path)?;
    for kline in &series.klines {
        writer.serialize(kline)?;
    }
    writer.flush()?;

    info!(
        symbol = %series.symbol,
        rows = series.len(),
        path = %path.display(),
        "💾 Klines saved"
    );
    Ok(())
}

pub fn load_klines_csv(path: &Path, symbol: &str, interval: Interval) -> Result<KlineSeries> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let klines = reader
        .deserialize::<Kline>()
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut series = KlineSeries::new(symbol, interval, klines);
    series.normalize_order();
    Ok(series)
}

fn format_cell(data: &ColumnData, row: usize) -> String {
    match data {
        ColumnData::Float(v) => v[row].to_string(),
        ColumnData::Bool(v) => v[row].to_string(),
        ColumnData::Timestamp(v) => v[row].to_string(),
    }
}

/// Write a feature table: one header row, one record per table row
pub fn write_table_csv(table: &FeatureTable, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(table.column_names())?;
    for row in 0..table.len() {
        let record: Vec<String> = table.iter().map(|(_, data)| format_cell(data, row)).collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!(
        rows = table.len(),
        columns = table.width(),
        path = %path.display(),
        "💾 Table saved"
    );
    Ok(())
}

fn parse_float(cell: &str) -> Result<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(f64::NAN);
    }
    cell.parse::<f64>()
        .map_err(|_| PipelineError::Config(format!("non-numeric cell '{}'", cell)))
}

fn infer_column(name: &str, cells: &[String]) -> Result<ColumnData> {
    if !cells.is_empty() && cells.iter().all(|c| c == "true" || c == "false") {
        return Ok(ColumnData::Bool(cells.iter().map(|c| c == "true").collect()));
    }
    if TIMESTAMP_COLUMNS.contains(&name) {
        let parsed: Option<Vec<i64>> = cells.iter().map(|c| c.trim().parse().ok()).collect();
        if let Some(values) = parsed {
            return Ok(ColumnData::Timestamp(values));
        }
    }
    let values = cells
        .iter()
        .map(|c| parse_float(c))
        .collect::<Result<Vec<f64>>>()
        .map_err(|e| PipelineError::Config(format!("column '{}': {}", name, e)))?;
    Ok(ColumnData::Float(values))
}

/// Read a table written by [`write_table_csv`]
pub fn read_table_csv(path: &Path) -> Result<FeatureTable> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record?;
        for (col, cell) in record.iter().enumerate().take(headers.len()) {
            cells[col].push(cell.to_string());
        }
    }

    let mut table = FeatureTable::new();
    for (name, column) in headers.iter().zip(cells.iter()) {
        table.insert(name.clone(), infer_column(name, column)?)?;
    }
    Ok(table)
}

/// Human-readable summary next to a checkpoint: columns, row count, last rows
pub fn write_table_info(table: &FeatureTable, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let mut file = fs::File::create(path)?;

    writeln!(file, "rows: {}", table.len())?;
    writeln!(file, "columns: {}", table.width())?;
    writeln!(file)?;
    for (i, (name, data)) in table.iter().enumerate() {
        let kind = match data {
            ColumnData::Float(_) => "float",
            ColumnData::Bool(_) => "bool",
            ColumnData::Timestamp(_) => "timestamp",
        };
        writeln!(file, "{:>5}  {:<48} {}", i, name, kind)?;
    }

    writeln!(file)?;
    writeln!(file, "last {} rows:", INFO_TAIL_ROWS.min(table.len()))?;
    writeln!(file, "{}", table.column_names().join(","))?;
    for row in table.len().saturating_sub(INFO_TAIL_ROWS)..table.len() {
        let cells: Vec<String> = table.iter().map(|(_, data)| format_cell(data, row)).collect();
        writeln!(file, "{}", cells.join(","))?;
    }
    Ok(())
}
