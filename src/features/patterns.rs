//! Candlestick pattern detectors
//!
//! Each detector is a pure predicate over a row and up to two preceding rows.
//! Rows without enough history are false.

use chrono::{Datelike, TimeZone, Timelike, Utc};

use super::keys::{FeatureKey, Pattern, PatternFlag};
use super::Candles;
use crate::error::Result;
use crate::table::FeatureTable;

/// Local-morning window (UTC close hour, inclusive)
const MORNING_HOURS: std::ops::RangeInclusive<u32> = 9..=12;

impl Pattern {
    /// Rows the predicate spans, including the current one
    pub fn lookback(&self) -> usize {
        match self {
            Pattern::Hammer => 1,
            Pattern::BullishEngulfing => 2,
            Pattern::MorningStar => 3,
        }
    }

    pub fn detect(&self, candles: &Candles) -> Vec<bool> {
        match self {
            Pattern::Hammer => hammer(&candles.open, &candles.high, &candles.low, &candles.close),
            Pattern::MorningStar => morning_star(&candles.open, &candles.close),
            Pattern::BullishEngulfing => bullish_engulfing(&candles.open, &candles.close),
        }
    }
}

pub fn hammer(open: &[f64], high: &[f64], low: &[f64], close: &[f64]) -> Vec<bool> {
    (0..close.len())
        .map(|t| {
            let range = high[t] - low[t];
            if !(range > 0.0) {
                return false;
            }
            (high[t] - close[t]) > 2.0 * (open[t] - low[t])
                && (close[t] - low[t]) / range > 0.6
                && (open[t] - low[t]) / range > 0.6
        })
        .collect()
}

pub fn morning_star(open: &[f64], close: &[f64]) -> Vec<bool> {
    (0..close.len())
        .map(|t| {
            t >= 2
                && close[t - 2] < open[t - 2]
                && open[t - 1] < close[t - 1]
                && close[t] > open[t]
        })
        .collect()
}

pub fn bullish_engulfing(open: &[f64], close: &[f64]) -> Vec<bool> {
    (0..close.len())
        .map(|t| {
            t >= 1
                && open[t - 1] > close[t - 1]
                && open[t] < close[t]
                && open[t] < close[t - 1]
                && close[t] > open[t - 1]
        })
        .collect()
}

pub fn is_morning(close_time_ms: i64) -> bool {
    Utc.timestamp_millis_opt(close_time_ms)
        .single()
        .map(|dt| MORNING_HOURS.contains(&dt.hour()))
        .unwrap_or(false)
}

pub fn is_weekend(close_time_ms: i64) -> bool {
    Utc.timestamp_millis_opt(close_time_ms)
        .single()
        .map(|dt| dt.weekday().num_days_from_monday() >= 5)
        .unwrap_or(false)
}

pub fn keys() -> Vec<FeatureKey> {
    Pattern::ALL
        .iter()
        .flat_map(|&p| {
            [PatternFlag::Occurred, PatternFlag::Morning, PatternFlag::Weekend]
                .into_iter()
                .map(move |flag| FeatureKey::Pattern(p, flag))
        })
        .collect()
}

/// Add every pattern with its morning/weekend flags
pub fn add_pattern_features(table: &mut FeatureTable, candles: &Candles) -> Result<()> {
    for pattern in Pattern::ALL {
        let occurred = pattern.detect(candles);
        let morning: Vec<bool> = occurred
            .iter()
            .zip(&candles.close_time)
            .map(|(&hit, &ts)| hit && is_morning(ts))
            .collect();
        let weekend: Vec<bool> = occurred
            .iter()
            .zip(&candles.close_time)
            .map(|(&hit, &ts)| hit && is_weekend(ts))
            .collect();

        table.insert_bool(&FeatureKey::Pattern(pattern, PatternFlag::Occurred), occurred)?;
        table.insert_bool(&FeatureKey::Pattern(pattern, PatternFlag::Morning), morning)?;
        table.insert_bool(&FeatureKey::Pattern(pattern, PatternFlag::Weekend), weekend)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-01-06 is a Saturday
    const SAT_10H: i64 = 1_704_535_200_000;
    const MON_05H: i64 = 1_704_690_000_000;

    #[test]
    fn test_morning_star_detected_on_third_row() {
        let open = vec![10.0, 8.0, 9.0];
        let close = vec![8.0, 9.0, 11.0];
        assert_eq!(morning_star(&open, &close), vec![false, false, true]);
    }

    #[test]
    fn test_bullish_engulfing() {
        let open = vec![10.0, 7.5];
        let close = vec![8.0, 11.0];
        assert_eq!(bullish_engulfing(&open, &close), vec![false, true]);
    }

    #[test]
    fn test_hammer_predicate() {
        // long lower wick, body near the top: the upper-wick clause still fails
        let hit = hammer(&[10.7], &[11.0], &[10.0], &[10.8]);
        assert_eq!(hit, vec![false]);
        // flat bar never qualifies
        assert_eq!(hammer(&[5.0], &[5.0], &[5.0], &[5.0]), vec![false]);
    }

    #[test]
    fn test_early_rows_false_for_any_input() {
        let open = vec![3.0, 1.0, 2.0, 0.5, 4.0];
        let close = vec![1.0, 2.0, 3.0, 4.0, 1.0];
        for (pattern, result) in [
            (Pattern::MorningStar, morning_star(&open, &close)),
            (Pattern::BullishEngulfing, bullish_engulfing(&open, &close)),
        ] {
            for t in 0..pattern.lookback() - 1 {
                assert!(!result[t], "{:?} row {}", pattern, t);
            }
        }
    }

    #[test]
    fn test_detection_is_pure() {
        let open = vec![10.0, 8.0, 9.0, 7.0];
        let close = vec![8.0, 9.0, 11.0, 6.0];
        assert_eq!(morning_star(&open, &close), morning_star(&open, &close));
    }

    #[test]
    fn test_calendar_flags() {
        assert!(is_weekend(SAT_10H));
        assert!(is_morning(SAT_10H));
        assert!(!is_weekend(MON_05H));
        assert!(!is_morning(MON_05H));
    }

    #[test]
    fn test_keys_cover_all_flags() {
        let keys = keys();
        assert_eq!(keys.len(), 9);
        assert!(keys.iter().any(|k| k.to_string() == "is_bullish_engulfing_morning"));
    }
}
