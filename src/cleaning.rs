//! Final column cleanup before scaling

use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::table::{ColumnData, FeatureTable};

/// Pass-through kline columns that carry no signal
pub const DEFAULT_DROP_COLUMNS: [&str; 7] = [
    "open_time",
    "close_time",
    "ignore",
    "quote_asset_volume",
    "number_of_trades",
    "taker_buy_base_asset_volume",
    "taker_buy_quote_asset_volume",
];

/// Drop `drop_list`, replace NaN with 0 and cast every column to float.
pub fn finalize_columns(mut table: FeatureTable, drop_list: &[&str]) -> Result<FeatureTable> {
    if table.is_empty() {
        return Err(PipelineError::EmptyTable("finalize_columns"));
    }

    let dropped = table.drop_columns(drop_list);
    for name in drop_list.iter().filter(|n| !dropped.iter().any(|d| d == *n)) {
        debug!("Drop column '{}' not present, skipping", name);
    }

    let mut filled = 0usize;
    let table = table.map_columns(|_, data| {
        let mut values = data.to_f64();
        for v in values.iter_mut().filter(|v| v.is_nan()) {
            *v = 0.0;
            filled += 1;
        }
        ColumnData::Float(values)
    });
    debug!(
        "Cleaned table: {} rows x {} columns, {} NaN cells filled",
        table.len(),
        table.width(),
        filled
    );
    Ok(table)
}
