//! Calendar features from the candle close time (UTC)

use chrono::{Datelike, TimeZone, Timelike, Utc};
use std::f64::consts::PI;

use super::keys::{CalendarField, FeatureKey};
use crate::error::Result;
use crate::table::{ColumnData, FeatureTable};

fn cyclic(value: f64, period: f64) -> (f64, f64) {
    let angle = 2.0 * PI * value / period;
    (angle.sin(), angle.cos())
}

/// Hour, weekday and month with sine/cosine encodings and a weekend flag
pub fn add_calendar_features(table: &mut FeatureTable, close_time: &[i64]) -> Result<()> {
    let len = close_time.len();
    let mut hour = vec![f64::NAN; len];
    let mut weekday = vec![f64::NAN; len];
    let mut month = vec![f64::NAN; len];

    for (t, &ms) in close_time.iter().enumerate() {
        if let Some(dt) = Utc.timestamp_millis_opt(ms).single() {
            hour[t] = dt.hour() as f64;
            weekday[t] = dt.weekday().num_days_from_monday() as f64;
            month[t] = dt.month() as f64;
        }
    }

    let encode = |values: &[f64], period: f64| -> (Vec<f64>, Vec<f64>) {
        values.iter().map(|&v| cyclic(v, period)).unzip()
    };
    let (hour_sin, hour_cos) = encode(&hour, 24.0);
    let (weekday_sin, weekday_cos) = encode(&weekday, 7.0);
    let (month_sin, month_cos) = encode(&month, 12.0);
    let weekend: Vec<bool> = weekday.iter().map(|&d| d >= 5.0).collect();

    let columns = [
        (CalendarField::Hour, ColumnData::Float(hour)),
        (CalendarField::Weekday, ColumnData::Float(weekday)),
        (CalendarField::Month, ColumnData::Float(month)),
        (CalendarField::HourSin, ColumnData::Float(hour_sin)),
        (CalendarField::HourCos, ColumnData::Float(hour_cos)),
        (CalendarField::WeekdaySin, ColumnData::Float(weekday_sin)),
        (CalendarField::WeekdayCos, ColumnData::Float(weekday_cos)),
        (CalendarField::MonthSin, ColumnData::Float(month_sin)),
        (CalendarField::MonthCos, ColumnData::Float(month_cos)),
        (CalendarField::Weekend, ColumnData::Bool(weekend)),
    ];
    for (field, data) in columns {
        table.insert(FeatureKey::Calendar(field).to_string(), data)?;
    }
    Ok(())
}

pub fn keys() -> Vec<FeatureKey> {
    CalendarField::ALL
        .iter()
        .map(|&f| FeatureKey::Calendar(f))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calendar_encoding() {
        // 2024-01-06 (Saturday) 18:00 UTC
        let ts = 1_704_564_000_000;
        let mut table = FeatureTable::new();
        add_calendar_features(&mut table, &[ts]).unwrap();

        assert_eq!(table.float("hour").unwrap()[0], 18.0);
        assert_eq!(table.float("weekday").unwrap()[0], 5.0);
        assert_eq!(table.float("month").unwrap()[0], 1.0);
        assert_eq!(table.get("is_weekend").unwrap().as_bool().unwrap(), &[true]);

        let s = table.float("hour_sin").unwrap()[0];
        let c = table.float("hour_cos").unwrap()[0];
        assert!((s - (-1.0)).abs() < 1e-12);
        assert!(c.abs() < 1e-12);
        assert_eq!(table.width(), keys().len());
    }
}
