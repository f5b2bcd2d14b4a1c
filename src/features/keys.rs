//! Structured feature keys
//!
//! Every derived column is identified by a [`FeatureKey`]. Its `Display`
//! rendering is the stable column name written to checkpoints.

use std::fmt;

/// A base series the engine can compute from klines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Indicator {
    Close,
    High,
    Low,
    Volume,
    Rsi(usize),
    Cci(usize),
    Mfi(usize),
    Atr(usize),
    Adx(usize),
    PlusDi(usize),
    MinusDi(usize),
    Ema(usize),
    Sma(usize),
    /// MACD line, keyed by fast period
    Macd(usize),
    /// MACD signal line, keyed by signal period
    MacdSignal(usize),
    /// MACD histogram, keyed by fast period
    MacdHistogram(usize),
    UpperBand,
    MiddleBand,
    LowerBand,
    StochK,
    StochD,
    StochRsiK,
    StochRsiD,
    Vwap,
    Psar,
}

impl Indicator {
    /// Raw kline columns already present in the table
    pub fn is_raw(&self) -> bool {
        matches!(
            self,
            Indicator::Close | Indicator::High | Indicator::Low | Indicator::Volume
        )
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Indicator::Close => f.write_str("close"),
            Indicator::High => f.write_str("high"),
            Indicator::Low => f.write_str("low"),
            Indicator::Volume => f.write_str("volume"),
            Indicator::Rsi(p) => write!(f, "rsi_{}", p),
            Indicator::Cci(p) => write!(f, "cci_{}", p),
            Indicator::Mfi(p) => write!(f, "mfi_{}", p),
            Indicator::Atr(p) => write!(f, "atr_{}", p),
            Indicator::Adx(p) => write!(f, "adx_{}", p),
            Indicator::PlusDi(p) => write!(f, "plus_di_{}", p),
            Indicator::MinusDi(p) => write!(f, "minus_di_{}", p),
            Indicator::Ema(p) => write!(f, "ema_{}", p),
            Indicator::Sma(p) => write!(f, "ma_{}", p),
            Indicator::Macd(p) => write!(f, "macd_{}", p),
            Indicator::MacdSignal(p) => write!(f, "macd_signal_{}", p),
            Indicator::MacdHistogram(p) => write!(f, "macd_histogram_{}", p),
            Indicator::UpperBand => f.write_str("upper_band"),
            Indicator::MiddleBand => f.write_str("middle_band"),
            Indicator::LowerBand => f.write_str("lower_band"),
            Indicator::StochK => f.write_str("stoch_k"),
            Indicator::StochD => f.write_str("stoch_d"),
            Indicator::StochRsiK => f.write_str("stoch_rsi_k"),
            Indicator::StochRsiD => f.write_str("stoch_rsi_d"),
            Indicator::Vwap => f.write_str("vwap"),
            Indicator::Psar => f.write_str("psar"),
        }
    }
}

/// A numeric or boolean view derived from one base series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Derivation {
    Value,
    Rising,
    Dropping,
    Change,
    PctChange,
    Lag(usize),
    Average(usize),
    AboveAverage(usize),
    BelowAverage(usize),
    ChangeVsAverage(usize),
    PctChangeVsAverage(usize),
    RollingMax(usize),
    RollingMin(usize),
}

/// Which series a signal is evaluated on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Value,
    Average(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Buy,
    Sell,
    BullishDivergence,
    BearishDivergence,
    StrongTrend,
    WeakTrend,
    NoTrend,
    BullishTrend,
    BearishTrend,
}

impl SignalKind {
    fn suffix(&self) -> &'static str {
        match self {
            SignalKind::Buy => "buy_signal",
            SignalKind::Sell => "sell_signal",
            SignalKind::BullishDivergence => "bullish_divergence_signal",
            SignalKind::BearishDivergence => "bearish_divergence_signal",
            SignalKind::StrongTrend => "strong_trend",
            SignalKind::WeakTrend => "weak_trend",
            SignalKind::NoTrend => "no_trend",
            SignalKind::BullishTrend => "bullish_trend_signal",
            SignalKind::BearishTrend => "bearish_trend_signal",
        }
    }
}

/// Row-wise relation between two series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Above,
    Below,
    CrossUp,
    CrossDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pattern {
    Hammer,
    MorningStar,
    BullishEngulfing,
}

impl Pattern {
    pub const ALL: [Pattern; 3] = [
        Pattern::Hammer,
        Pattern::MorningStar,
        Pattern::BullishEngulfing,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Pattern::Hammer => "hammer",
            Pattern::MorningStar => "morning_star",
            Pattern::BullishEngulfing => "bullish_engulfing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternFlag {
    Occurred,
    Morning,
    Weekend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalendarField {
    Hour,
    Weekday,
    Month,
    HourSin,
    HourCos,
    WeekdaySin,
    WeekdayCos,
    MonthSin,
    MonthCos,
    Weekend,
}

impl CalendarField {
    pub const ALL: [CalendarField; 10] = [
        CalendarField::Hour,
        CalendarField::Weekday,
        CalendarField::Month,
        CalendarField::HourSin,
        CalendarField::HourCos,
        CalendarField::WeekdaySin,
        CalendarField::WeekdayCos,
        CalendarField::MonthSin,
        CalendarField::MonthCos,
        CalendarField::Weekend,
    ];

    fn name(&self) -> &'static str {
        match self {
            CalendarField::Hour => "hour",
            CalendarField::Weekday => "weekday",
            CalendarField::Month => "month",
            CalendarField::HourSin => "hour_sin",
            CalendarField::HourCos => "hour_cos",
            CalendarField::WeekdaySin => "weekday_sin",
            CalendarField::WeekdayCos => "weekday_cos",
            CalendarField::MonthSin => "month_sin",
            CalendarField::MonthCos => "month_cos",
            CalendarField::Weekend => "is_weekend",
        }
    }
}

/// Stable identity of a feature column
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeatureKey {
    /// Column copied from the kline row
    Raw(&'static str),
    Series(Indicator, Derivation),
    Signal {
        indicator: Indicator,
        scope: Scope,
        kind: SignalKind,
    },
    Relation(Indicator, Relation, Indicator),
    Pattern(Pattern, PatternFlag),
    Calendar(CalendarField),
    /// One-off composite features
    Named(&'static str),
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureKey::Raw(name) | FeatureKey::Named(name) => f.write_str(name),
            FeatureKey::Series(ind, derivation) => match derivation {
                Derivation::Value => write!(f, "{}", ind),
                Derivation::Rising => write!(f, "is_{}_rising", ind),
                Derivation::Dropping => write!(f, "is_{}_dropping", ind),
                Derivation::Change => write!(f, "{}_change", ind),
                Derivation::PctChange => write!(f, "{}_pct_change", ind),
                Derivation::Lag(n) => write!(f, "{}_lag_{}", ind, n),
                Derivation::Average(n) => write!(f, "{}_ma_{}", ind, n),
                Derivation::AboveAverage(n) => write!(f, "is_{}_rising_in_avg_period_{}", ind, n),
                Derivation::BelowAverage(n) => {
                    write!(f, "is_{}_dropping_in_avg_period_{}", ind, n)
                }
                Derivation::ChangeVsAverage(n) => write!(f, "{}_change_vs_ma_{}", ind, n),
                Derivation::PctChangeVsAverage(n) => write!(f, "{}_pct_change_vs_ma_{}", ind, n),
                Derivation::RollingMax(n) => write!(f, "max_{}_in_{}", ind, n),
                Derivation::RollingMin(n) => write!(f, "min_{}_in_{}", ind, n),
            },
            FeatureKey::Signal {
                indicator,
                scope,
                kind,
            } => match scope {
                Scope::Value => write!(f, "{}_{}", indicator, kind.suffix()),
                Scope::Average(n) => write!(f, "{}_ma_{}_{}", indicator, n, kind.suffix()),
            },
            FeatureKey::Relation(a, relation, b) => match relation {
                Relation::Above => write!(f, "{}_above_{}", a, b),
                Relation::Below => write!(f, "{}_below_{}", a, b),
                Relation::CrossUp => write!(f, "{}_crosses_above_{}", a, b),
                Relation::CrossDown => write!(f, "{}_crosses_below_{}", a, b),
            },
            FeatureKey::Pattern(pattern, flag) => match flag {
                PatternFlag::Occurred => f.write_str(pattern.name()),
                PatternFlag::Morning => write!(f, "is_{}_morning", pattern.name()),
                PatternFlag::Weekend => write!(f, "is_{}_weekend", pattern.name()),
            },
            FeatureKey::Calendar(field) => f.write_str(field.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_names() {
        let key = FeatureKey::Series(Indicator::Rsi(14), Derivation::PctChangeVsAverage(5));
        assert_eq!(key.to_string(), "rsi_14_pct_change_vs_ma_5");
        let key = FeatureKey::Series(Indicator::Close, Derivation::AboveAverage(28));
        assert_eq!(key.to_string(), "is_close_rising_in_avg_period_28");
        let key = FeatureKey::Series(Indicator::High, Derivation::RollingMax(14));
        assert_eq!(key.to_string(), "max_high_in_14");
    }

    #[test]
    fn test_signal_and_relation_names() {
        let key = FeatureKey::Signal {
            indicator: Indicator::Mfi(14),
            scope: Scope::Average(5),
            kind: SignalKind::BullishDivergence,
        };
        assert_eq!(key.to_string(), "mfi_14_ma_5_bullish_divergence_signal");

        let key = FeatureKey::Relation(Indicator::Ema(9), Relation::CrossUp, Indicator::Ema(21));
        assert_eq!(key.to_string(), "ema_9_crosses_above_ema_21");
    }

    #[test]
    fn test_pattern_names() {
        assert_eq!(
            FeatureKey::Pattern(Pattern::MorningStar, PatternFlag::Occurred).to_string(),
            "morning_star"
        );
        assert_eq!(
            FeatureKey::Pattern(Pattern::Hammer, PatternFlag::Weekend).to_string(),
            "is_hammer_weekend"
        );
    }
}
