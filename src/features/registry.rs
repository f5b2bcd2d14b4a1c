//! Declarative feature registry
//!
//! The feature surface is a list of (indicator, periods, signal options)
//! entries plus a list of pairwise relations. One generic routine,
//! [`derive_trend_family`], turns each entry into its columns.

use std::collections::HashMap;

use super::keys::{Derivation, FeatureKey, Indicator, Relation, Scope, SignalKind};
use super::{calendar, math, patterns};
use crate::config::IndicatorSettings;
use crate::error::Result;
use crate::table::{ColumnData, FeatureTable};

/// Buy below `buy`, sell above `sell`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub buy: f64,
    pub sell: f64,
}

/// One registry entry: a base series and the views derived from it
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSpec {
    pub indicator: Indicator,
    /// Periods for the vs-moving-average family
    pub averages: Vec<usize>,
    pub thresholds: Option<Thresholds>,
    /// Emit divergence flags against the close
    pub divergence: bool,
    /// Emit rolling max/min over each average period
    pub extremes: bool,
    pub lags: Vec<usize>,
}

impl FeatureSpec {
    pub fn new(indicator: Indicator) -> Self {
        Self {
            indicator,
            averages: Vec::new(),
            thresholds: None,
            divergence: false,
            extremes: false,
            lags: Vec::new(),
        }
    }

    pub fn averages(mut self, periods: &[usize]) -> Self {
        self.averages = periods.to_vec();
        self
    }

    pub fn thresholds(mut self, buy: f64, sell: f64) -> Self {
        self.thresholds = Some(Thresholds { buy, sell });
        self
    }

    pub fn divergence(mut self) -> Self {
        self.divergence = true;
        self
    }

    pub fn extremes(mut self) -> Self {
        self.extremes = true;
        self
    }

    pub fn lags(mut self, lags: &[usize]) -> Self {
        self.lags = lags.to_vec();
        self
    }

    /// Keys emitted by [`derive_trend_family`] for this entry, in insertion order
    pub fn keys(&self) -> Vec<FeatureKey> {
        let ind = self.indicator;
        let series = |d| FeatureKey::Series(ind, d);
        let signal = |scope, kind| FeatureKey::Signal {
            indicator: ind,
            scope,
            kind,
        };

        let mut keys = Vec::new();
        if !ind.is_raw() {
            keys.push(series(Derivation::Value));
        }
        keys.extend([
            series(Derivation::Rising),
            series(Derivation::Dropping),
            series(Derivation::Change),
            series(Derivation::PctChange),
        ]);
        keys.extend(self.lags.iter().map(|&n| series(Derivation::Lag(n))));

        for &n in &self.averages {
            keys.extend([
                series(Derivation::Average(n)),
                series(Derivation::AboveAverage(n)),
                series(Derivation::BelowAverage(n)),
                series(Derivation::ChangeVsAverage(n)),
                series(Derivation::PctChangeVsAverage(n)),
            ]);
            if self.extremes {
                keys.push(series(Derivation::RollingMax(n)));
                keys.push(series(Derivation::RollingMin(n)));
            }
        }

        let scopes: Vec<Scope> = std::iter::once(Scope::Value)
            .chain(self.averages.iter().map(|&n| Scope::Average(n)))
            .collect();
        if self.thresholds.is_some() {
            for &scope in &scopes {
                keys.push(signal(scope, SignalKind::Buy));
                keys.push(signal(scope, SignalKind::Sell));
            }
        }
        if self.divergence {
            for &scope in &scopes {
                keys.push(signal(scope, SignalKind::BullishDivergence));
                keys.push(signal(scope, SignalKind::BearishDivergence));
            }
        }
        keys
    }
}

/// Pairwise relations between two base series
#[derive(Debug, Clone, PartialEq)]
pub struct RelationSpec {
    pub left: Indicator,
    pub right: Indicator,
    pub relations: Vec<Relation>,
}

impl RelationSpec {
    pub fn new(left: Indicator, right: Indicator, relations: &[Relation]) -> Self {
        Self {
            left,
            right,
            relations: relations.to_vec(),
        }
    }

    pub fn keys(&self) -> Vec<FeatureKey> {
        self.relations
            .iter()
            .map(|&r| FeatureKey::Relation(self.left, r, self.right))
            .collect()
    }

    /// Evaluate one relation row by row
    pub fn evaluate(relation: Relation, left: &[f64], right: &[f64]) -> Vec<bool> {
        (0..left.len())
            .map(|t| match relation {
                Relation::Above => left[t] > right[t],
                Relation::Below => left[t] < right[t],
                Relation::CrossUp => math::crossed_above(left, right, t),
                Relation::CrossDown => math::crossed_below(left, right, t),
            })
            .collect()
    }
}

/// Fixed names of the composite features
pub mod named {
    pub const IS_SUPPORT: &str = "is_support";
    pub const IS_RESISTANCE: &str = "is_resistance";
    pub const MOMENTUM_POSITIVE: &str = "momentum_positive_signal";
    pub const MOMENTUM_NEGATIVE: &str = "momentum_negative_signal";
    pub const TREND_REVERSAL: &str = "trend_reversal_signal";
    pub const RSI_MACD_RATIO: &str = "rsi_macd_ratio";
    pub const MACD_SIGNAL_DIFF: &str = "macd_signal_diff";

    pub const ALL: [&str; 7] = [
        IS_SUPPORT,
        IS_RESISTANCE,
        MOMENTUM_POSITIVE,
        MOMENTUM_NEGATIVE,
        TREND_REVERSAL,
        RSI_MACD_RATIO,
        MACD_SIGNAL_DIFF,
    ];
}

const ALL_RELATIONS: [Relation; 4] = [
    Relation::Above,
    Relation::Below,
    Relation::CrossUp,
    Relation::CrossDown,
];

const CROSSES: [Relation; 2] = [Relation::CrossUp, Relation::CrossDown];

/// Buy/sell flag from where the close sits relative to a price-level series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceSignal {
    pub indicator: Indicator,
    pub kind: SignalKind,
    /// Relation of the close to the indicator that fires the flag
    pub relation: Relation,
}

impl PriceSignal {
    pub fn new(indicator: Indicator, kind: SignalKind, relation: Relation) -> Self {
        Self {
            indicator,
            kind,
            relation,
        }
    }

    pub fn key(&self) -> FeatureKey {
        FeatureKey::Signal {
            indicator: self.indicator,
            scope: Scope::Value,
            kind: self.kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRegistry {
    specs: Vec<FeatureSpec>,
    relations: Vec<RelationSpec>,
    price_signals: Vec<PriceSignal>,
    trend_periods: Vec<usize>,
    macd_histogram: Indicator,
}

impl FeatureRegistry {
    pub fn from_settings(s: &IndicatorSettings) -> Self {
        let avg = s.average_periods.as_slice();
        let lag = [s.lag_period];
        let oscillator_periods = s.oscillator_periods();

        let mut specs = vec![
            FeatureSpec::new(Indicator::Close)
                .averages(avg)
                .extremes()
                .lags(&lag),
            FeatureSpec::new(Indicator::High).averages(avg).extremes(),
            FeatureSpec::new(Indicator::Low).averages(avg).extremes(),
            FeatureSpec::new(Indicator::Volume).averages(avg).lags(&lag),
        ];

        for &p in &oscillator_periods {
            let rsi_lags: &[usize] = if p == s.general_timeperiod { &lag } else { &[] };
            specs.extend([
                FeatureSpec::new(Indicator::Rsi(p))
                    .averages(avg)
                    .thresholds(s.rsi_buy_value, s.rsi_sell_value)
                    .divergence()
                    .lags(rsi_lags),
                FeatureSpec::new(Indicator::Cci(p))
                    .averages(avg)
                    .thresholds(s.cci_buy_value, s.cci_sell_value)
                    .divergence(),
                FeatureSpec::new(Indicator::Mfi(p))
                    .averages(avg)
                    .thresholds(s.mfi_buy_value, s.mfi_sell_value)
                    .divergence(),
                FeatureSpec::new(Indicator::Atr(p)).averages(avg),
                FeatureSpec::new(Indicator::Adx(p)).averages(avg),
                FeatureSpec::new(Indicator::PlusDi(p)).averages(avg),
                FeatureSpec::new(Indicator::MinusDi(p)).averages(avg),
            ]);
        }

        let fast = Indicator::Ema(s.ema_fast_timeperiod);
        let slow = Indicator::Ema(s.ema_slow_timeperiod);
        let macd = Indicator::Macd(s.macd_timeperiod);
        let macd_signal = Indicator::MacdSignal(s.macd_signalperiod);
        let macd_histogram = Indicator::MacdHistogram(s.macd_timeperiod);
        let ma_fast = Indicator::Sma(s.ma_fast_timeperiod);
        let ma_slow = Indicator::Sma(s.ma_slow_timeperiod);

        specs.extend([
            FeatureSpec::new(fast).averages(avg),
            FeatureSpec::new(slow).averages(avg),
            FeatureSpec::new(macd).averages(avg),
            FeatureSpec::new(macd_signal).averages(avg),
            FeatureSpec::new(macd_histogram).averages(avg),
            FeatureSpec::new(Indicator::StochK)
                .averages(avg)
                .thresholds(s.stoch_buy_value, s.stoch_sell_value),
            FeatureSpec::new(Indicator::StochD)
                .averages(avg)
                .thresholds(s.stoch_buy_value, s.stoch_sell_value),
            FeatureSpec::new(Indicator::StochRsiK)
                .averages(avg)
                .thresholds(s.stoch_buy_value, s.stoch_sell_value),
            FeatureSpec::new(Indicator::StochRsiD)
                .averages(avg)
                .thresholds(s.stoch_buy_value, s.stoch_sell_value),
            FeatureSpec::new(Indicator::UpperBand),
            FeatureSpec::new(Indicator::MiddleBand),
            FeatureSpec::new(Indicator::LowerBand),
            FeatureSpec::new(Indicator::Vwap),
            FeatureSpec::new(Indicator::Psar),
            FeatureSpec::new(ma_fast),
            FeatureSpec::new(ma_slow),
        ]);

        let relations = vec![
            RelationSpec::new(fast, slow, &ALL_RELATIONS),
            RelationSpec::new(macd, macd_signal, &ALL_RELATIONS),
            RelationSpec::new(Indicator::StochK, Indicator::StochD, &CROSSES),
            RelationSpec::new(Indicator::StochRsiK, Indicator::StochRsiD, &CROSSES),
            RelationSpec::new(Indicator::Close, Indicator::Vwap, &CROSSES),
            RelationSpec::new(Indicator::Close, Indicator::Psar, &CROSSES),
            RelationSpec::new(Indicator::Close, ma_fast, &[Relation::Above, Relation::Below]),
            RelationSpec::new(Indicator::Close, ma_slow, &[Relation::Above, Relation::Below]),
            // golden / death cross
            RelationSpec::new(ma_fast, ma_slow, &CROSSES),
        ];

        let price_signals = vec![
            PriceSignal::new(Indicator::LowerBand, SignalKind::Buy, Relation::Below),
            PriceSignal::new(Indicator::UpperBand, SignalKind::Sell, Relation::Above),
            PriceSignal::new(Indicator::Vwap, SignalKind::Buy, Relation::Above),
            PriceSignal::new(Indicator::Vwap, SignalKind::Sell, Relation::Below),
            PriceSignal::new(Indicator::Psar, SignalKind::Buy, Relation::Above),
            PriceSignal::new(Indicator::Psar, SignalKind::Sell, Relation::Below),
        ];

        Self {
            specs,
            relations,
            price_signals,
            trend_periods: oscillator_periods,
            macd_histogram,
        }
    }

    pub fn specs(&self) -> &[FeatureSpec] {
        &self.specs
    }

    pub fn relations(&self) -> &[RelationSpec] {
        &self.relations
    }

    pub fn price_signals(&self) -> &[PriceSignal] {
        &self.price_signals
    }

    pub(crate) fn trend_periods(&self) -> &[usize] {
        &self.trend_periods
    }

    pub(crate) fn macd_histogram(&self) -> Indicator {
        self.macd_histogram
    }

    /// Every average period used by any entry
    pub fn average_periods(&self) -> Vec<usize> {
        let mut periods: Vec<usize> = self
            .specs
            .iter()
            .flat_map(|s| s.averages.iter().copied())
            .collect();
        periods.sort_unstable();
        periods.dedup();
        periods
    }

    /// ADX trend-strength and direction flags per oscillator period
    pub fn trend_keys(&self) -> Vec<FeatureKey> {
        self.trend_periods
            .iter()
            .flat_map(|&p| {
                [
                    SignalKind::StrongTrend,
                    SignalKind::WeakTrend,
                    SignalKind::NoTrend,
                    SignalKind::BullishTrend,
                    SignalKind::BearishTrend,
                ]
                .into_iter()
                .map(move |kind| FeatureKey::Signal {
                    indicator: Indicator::Adx(p),
                    scope: Scope::Value,
                    kind,
                })
            })
            .collect()
    }

    pub fn macd_flip_keys(&self) -> [FeatureKey; 2] {
        [SignalKind::Buy, SignalKind::Sell].map(|kind| FeatureKey::Signal {
            indicator: self.macd_histogram,
            scope: Scope::Value,
            kind,
        })
    }

    /// Every derived key the engine emits, excluding the raw kline columns
    pub fn keys(&self) -> Vec<FeatureKey> {
        let mut keys: Vec<FeatureKey> = self.specs.iter().flat_map(FeatureSpec::keys).collect();
        keys.extend(self.relations.iter().flat_map(RelationSpec::keys));
        keys.extend(self.price_signals.iter().map(PriceSignal::key));
        keys.extend(self.trend_keys());
        keys.extend(self.macd_flip_keys());
        keys.extend(patterns::keys());
        keys.extend(calendar::keys());
        keys.extend(named::ALL.iter().map(|&n| FeatureKey::Named(n)));
        keys
    }
}

/// Close-price direction shared by every divergence check
pub struct PriceContext {
    close_diff: Vec<f64>,
    close: Vec<f64>,
    averages: HashMap<usize, Vec<f64>>,
}

impl PriceContext {
    pub fn new(close: &[f64], periods: &[usize]) -> Self {
        Self {
            close_diff: math::diff(close),
            close: close.to_vec(),
            averages: periods
                .iter()
                .map(|&n| (n, math::rolling_mean(close, n)))
                .collect(),
        }
    }

    fn rising(&self, t: usize) -> bool {
        self.close_diff[t] > 0.0
    }

    fn dropping(&self, t: usize) -> bool {
        self.close_diff[t] < 0.0
    }

    fn above_average(&self, n: usize, t: usize) -> bool {
        self.averages
            .get(&n)
            .map(|ma| self.close[t] > ma[t])
            .unwrap_or(false)
    }

    fn below_average(&self, n: usize, t: usize) -> bool {
        self.averages
            .get(&n)
            .map(|ma| self.close[t] < ma[t])
            .unwrap_or(false)
    }
}

/// Derive the trend / vs-moving-average family of `spec` from its base `values`
pub fn derive_trend_family(
    table: &mut FeatureTable,
    spec: &FeatureSpec,
    values: &[f64],
    price: &PriceContext,
) -> Result<()> {
    let len = values.len();
    let change = math::diff(values);
    let mut averages: HashMap<usize, Vec<f64>> = HashMap::new();

    for key in spec.keys() {
        let data = match &key {
            FeatureKey::Series(_, derivation) => match *derivation {
                Derivation::Value => ColumnData::Float(values.to_vec()),
                Derivation::Rising => ColumnData::Bool(change.iter().map(|d| *d > 0.0).collect()),
                Derivation::Dropping => {
                    ColumnData::Bool(change.iter().map(|d| *d < 0.0).collect())
                }
                Derivation::Change => ColumnData::Float(change.clone()),
                Derivation::PctChange => ColumnData::Float(math::pct_change(values)),
                Derivation::Lag(n) => ColumnData::Float(math::lag(values, n)),
                Derivation::Average(n) => {
                    let ma = averages
                        .entry(n)
                        .or_insert_with(|| math::rolling_mean(values, n));
                    ColumnData::Float(ma.clone())
                }
                Derivation::AboveAverage(n) => {
                    let ma = averages
                        .entry(n)
                        .or_insert_with(|| math::rolling_mean(values, n));
                    ColumnData::Bool((0..len).map(|t| values[t] > ma[t]).collect())
                }
                Derivation::BelowAverage(n) => {
                    let ma = averages
                        .entry(n)
                        .or_insert_with(|| math::rolling_mean(values, n));
                    ColumnData::Bool((0..len).map(|t| values[t] < ma[t]).collect())
                }
                Derivation::ChangeVsAverage(n) => {
                    let ma = averages
                        .entry(n)
                        .or_insert_with(|| math::rolling_mean(values, n));
                    ColumnData::Float((0..len).map(|t| values[t] - ma[t]).collect())
                }
                Derivation::PctChangeVsAverage(n) => {
                    let ma = averages
                        .entry(n)
                        .or_insert_with(|| math::rolling_mean(values, n));
                    ColumnData::Float(
                        (0..len)
                            .map(|t| {
                                if values[t].is_nan() || ma[t].is_nan() {
                                    f64::NAN
                                } else {
                                    math::safe_pct(values[t], ma[t])
                                }
                            })
                            .collect(),
                    )
                }
                Derivation::RollingMax(n) => ColumnData::Float(math::rolling_max(values, n)),
                Derivation::RollingMin(n) => ColumnData::Float(math::rolling_min(values, n)),
            },
            FeatureKey::Signal { scope, kind, .. } => {
                let base: Vec<f64> = match *scope {
                    Scope::Value => values.to_vec(),
                    Scope::Average(n) => averages
                        .entry(n)
                        .or_insert_with(|| math::rolling_mean(values, n))
                        .clone(),
                };
                ColumnData::Bool(signal_flags(spec, *scope, *kind, &base, values, price))
            }
            _ => continue,
        };
        table.insert(key.to_string(), data)?;
    }
    Ok(())
}

fn signal_flags(
    spec: &FeatureSpec,
    scope: Scope,
    kind: SignalKind,
    base: &[f64],
    values: &[f64],
    price: &PriceContext,
) -> Vec<bool> {
    let len = base.len();
    match kind {
        SignalKind::Buy => match spec.thresholds {
            Some(th) => base.iter().map(|&v| v < th.buy).collect(),
            None => vec![false; len],
        },
        SignalKind::Sell => match spec.thresholds {
            Some(th) => base.iter().map(|&v| v > th.sell).collect(),
            None => vec![false; len],
        },
        SignalKind::BullishDivergence => match scope {
            Scope::Value => {
                let d = math::diff(base);
                (0..len).map(|t| d[t] > 0.0 && price.dropping(t)).collect()
            }
            // oscillator above its own average while price sits below its average
            Scope::Average(n) => (0..len)
                .map(|t| values[t] > base[t] && price.below_average(n, t))
                .collect(),
        },
        SignalKind::BearishDivergence => match scope {
            Scope::Value => {
                let d = math::diff(base);
                (0..len).map(|t| d[t] < 0.0 && price.rising(t)).collect()
            }
            Scope::Average(n) => (0..len)
                .map(|t| values[t] < base[t] && price.above_average(n, t))
                .collect(),
        },
        _ => vec![false; len],
    }
}
