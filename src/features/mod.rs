//! Indicator engine
//!
//! Turns a kline series into the wide feature table:
//! - raw kline columns
//! - oscillators, averages, MACD, bands, VWAP and PSAR with their trend families
//! - pairwise relations and price-level signals
//! - ADX trend flags, candlestick patterns and calendar encodings
//! - a handful of composite momentum features

use std::collections::HashMap;
use tracing::{debug, info};

pub mod calendar;
pub mod keys;
pub mod math;
pub mod patterns;
pub mod registry;

pub use keys::{
    CalendarField, Derivation, FeatureKey, Indicator, Pattern, PatternFlag, Relation, Scope,
    SignalKind,
};
pub use registry::{
    derive_trend_family, FeatureRegistry, FeatureSpec, PriceContext, PriceSignal, RelationSpec,
    Thresholds,
};

use crate::config::IndicatorSettings;
use crate::error::{PipelineError, Result};
use crate::table::{ColumnData, FeatureTable};
use crate::types::KlineSeries;

/// Denominator guard for `rsi_macd_ratio`
const RATIO_EPSILON: f64 = 1e-10;

/// Columnar view of a kline series
#[derive(Debug, Clone, Default)]
pub struct Candles {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
    pub open_time: Vec<i64>,
    pub close_time: Vec<i64>,
}

impl Candles {
    pub fn from_series(series: &KlineSeries) -> Self {
        let mut c = Candles::default();
        for k in &series.klines {
            c.open.push(k.open);
            c.high.push(k.high);
            c.low.push(k.low);
            c.close.push(k.close);
            c.volume.push(k.volume);
            c.open_time.push(k.open_time);
            c.close_time.push(k.close_time);
        }
        c
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }
}

impl Indicator {
    /// Compute this series over `candles`
    pub fn compute(&self, candles: &Candles, settings: &IndicatorSettings) -> Vec<f64> {
        self.compute_group(candles, settings)
            .into_iter()
            .find(|(ind, _)| ind == self)
            .map(|(_, values)| values)
            .unwrap_or_else(|| vec![f64::NAN; candles.len()])
    }

    /// Compute this series together with the siblings that fall out of the same pass
    fn compute_group(
        &self,
        c: &Candles,
        s: &IndicatorSettings,
    ) -> Vec<(Indicator, Vec<f64>)> {
        let (h, l, cl, v) = (&c.high, &c.low, &c.close, &c.volume);
        match *self {
            Indicator::Close => vec![(*self, cl.clone())],
            Indicator::High => vec![(*self, h.clone())],
            Indicator::Low => vec![(*self, l.clone())],
            Indicator::Volume => vec![(*self, v.clone())],
            Indicator::Rsi(p) => vec![(*self, math::rsi(cl, p))],
            Indicator::Cci(p) => vec![(*self, math::cci(h, l, cl, p))],
            Indicator::Mfi(p) => vec![(*self, math::mfi(h, l, cl, v, p))],
            Indicator::Atr(p) => vec![(*self, math::atr(h, l, cl, p))],
            Indicator::Adx(p) | Indicator::PlusDi(p) | Indicator::MinusDi(p) => {
                let d = math::directional(h, l, cl, p);
                vec![
                    (Indicator::Adx(p), d.adx),
                    (Indicator::PlusDi(p), d.plus_di),
                    (Indicator::MinusDi(p), d.minus_di),
                ]
            }
            Indicator::Ema(p) => vec![(*self, math::ema(cl, p))],
            Indicator::Sma(p) => vec![(*self, math::rolling_mean(cl, p))],
            Indicator::Macd(fast) | Indicator::MacdHistogram(fast) => {
                let m = math::macd(cl, fast, s.macd_slowperiod, s.macd_signalperiod);
                vec![
                    (Indicator::Macd(fast), m.line),
                    (Indicator::MacdSignal(s.macd_signalperiod), m.signal),
                    (Indicator::MacdHistogram(fast), m.histogram),
                ]
            }
            Indicator::MacdSignal(signal) => {
                let m = math::macd(cl, s.macd_timeperiod, s.macd_slowperiod, signal);
                vec![
                    (Indicator::Macd(s.macd_timeperiod), m.line),
                    (Indicator::MacdSignal(signal), m.signal),
                    (Indicator::MacdHistogram(s.macd_timeperiod), m.histogram),
                ]
            }
            Indicator::UpperBand | Indicator::MiddleBand | Indicator::LowerBand => {
                let b = math::bollinger(cl, s.bollinger_timeperiod, s.bollinger_nbdev);
                vec![
                    (Indicator::UpperBand, b.upper),
                    (Indicator::MiddleBand, b.middle),
                    (Indicator::LowerBand, b.lower),
                ]
            }
            Indicator::StochK | Indicator::StochD => {
                let (k, d) = math::stochastic(
                    h,
                    l,
                    cl,
                    s.stoch_fastk_period,
                    s.stoch_slowk_period,
                    s.stoch_slowd_period,
                );
                vec![(Indicator::StochK, k), (Indicator::StochD, d)]
            }
            Indicator::StochRsiK | Indicator::StochRsiD => {
                let (k, d) = math::stoch_rsi(
                    cl,
                    s.stoch_rsi_timeperiod,
                    s.stoch_rsi_fastk_period,
                    s.stoch_rsi_fastd_period,
                );
                vec![(Indicator::StochRsiK, k), (Indicator::StochRsiD, d)]
            }
            Indicator::Vwap => vec![(*self, math::vwap(h, l, cl, v))],
            Indicator::Psar => vec![(
                *self,
                math::parabolic_sar(h, l, s.psar_acceleration, s.psar_maximum),
            )],
        }
    }
}

/// Memoizes base series so multi-output indicators run once per table
struct SeriesCache<'a> {
    candles: &'a Candles,
    settings: &'a IndicatorSettings,
    series: HashMap<Indicator, Vec<f64>>,
}

impl<'a> SeriesCache<'a> {
    fn new(candles: &'a Candles, settings: &'a IndicatorSettings) -> Self {
        Self {
            candles,
            settings,
            series: HashMap::new(),
        }
    }

    fn get(&mut self, indicator: Indicator) -> Vec<f64> {
        if let Some(values) = self.series.get(&indicator) {
            return values.clone();
        }
        for (ind, values) in indicator.compute_group(self.candles, self.settings) {
            self.series.entry(ind).or_insert(values);
        }
        self.series
            .get(&indicator)
            .cloned()
            .unwrap_or_else(|| vec![f64::NAN; self.candles.len()])
    }
}

pub struct IndicatorEngine {
    settings: IndicatorSettings,
    registry: FeatureRegistry,
}

impl IndicatorEngine {
    pub fn new(settings: IndicatorSettings) -> Self {
        let registry = FeatureRegistry::from_settings(&settings);
        Self { settings, registry }
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    /// Build the full feature table for one series
    pub fn compute(&self, series: &KlineSeries) -> Result<FeatureTable> {
        if series.is_empty() {
            return Err(PipelineError::EmptyTable("compute_indicators"));
        }
        info!(
            "⚙️ Computing indicators for {} {} ({} rows)",
            series.symbol,
            series.interval,
            series.len()
        );

        let candles = Candles::from_series(series);
        let mut table = FeatureTable::from_series(series)?;
        let mut cache = SeriesCache::new(&candles, &self.settings);
        let price = PriceContext::new(&candles.close, &self.registry.average_periods());

        for spec in self.registry.specs() {
            let values = cache.get(spec.indicator);
            derive_trend_family(&mut table, spec, &values, &price)?;
        }

        for relation in self.registry.relations() {
            let left = cache.get(relation.left);
            let right = cache.get(relation.right);
            for &r in &relation.relations {
                let key = FeatureKey::Relation(relation.left, r, relation.right);
                table.insert_bool(&key, RelationSpec::evaluate(r, &left, &right))?;
            }
        }

        for signal in self.registry.price_signals() {
            let level = cache.get(signal.indicator);
            let flags = RelationSpec::evaluate(signal.relation, &candles.close, &level);
            table.insert_bool(&signal.key(), flags)?;
        }

        for &p in self.registry.trend_periods() {
            let adx = cache.get(Indicator::Adx(p));
            let plus = cache.get(Indicator::PlusDi(p));
            let minus = cache.get(Indicator::MinusDi(p));
            self.add_trend_flags(&mut table, p, &adx, &plus, &minus)?;
        }

        let histogram = cache.get(self.registry.macd_histogram());
        self.add_macd_flips(&mut table, &histogram)?;

        patterns::add_pattern_features(&mut table, &candles)?;
        calendar::add_calendar_features(&mut table, &candles.close_time)?;

        let rsi = cache.get(Indicator::Rsi(self.settings.general_timeperiod));
        let signal = cache.get(Indicator::MacdSignal(self.settings.macd_signalperiod));
        add_composites(
            &mut table,
            &candles.close,
            self.settings.general_timeperiod,
            &rsi,
            &histogram,
            &signal,
        )?;

        debug!("Feature table: {} rows x {} columns", table.len(), table.width());
        info!("✅ {} feature columns computed", table.width());
        Ok(table)
    }

    fn add_trend_flags(
        &self,
        table: &mut FeatureTable,
        period: usize,
        adx: &[f64],
        plus_di: &[f64],
        minus_di: &[f64],
    ) -> Result<()> {
        let s = &self.settings;
        let len = adx.len();
        let key = |kind| FeatureKey::Signal {
            indicator: Indicator::Adx(period),
            scope: Scope::Value,
            kind,
        };
        let strong = |t: usize| adx[t] > s.adx_strong_trend;

        table.insert_bool(
            &key(SignalKind::StrongTrend),
            (0..len).map(strong).collect(),
        )?;
        table.insert_bool(
            &key(SignalKind::WeakTrend),
            adx.iter()
                .map(|&a| a >= s.adx_weak_trend && a <= s.adx_strong_trend)
                .collect(),
        )?;
        table.insert_bool(
            &key(SignalKind::NoTrend),
            adx.iter().map(|&a| a < s.adx_no_trend).collect(),
        )?;
        table.insert_bool(
            &key(SignalKind::BullishTrend),
            (0..len).map(|t| strong(t) && plus_di[t] > minus_di[t]).collect(),
        )?;
        table.insert_bool(
            &key(SignalKind::BearishTrend),
            (0..len).map(|t| strong(t) && minus_di[t] > plus_di[t]).collect(),
        )?;
        Ok(())
    }

    /// Histogram sign flips: buy on a move above zero, sell on a move below
    fn add_macd_flips(&self, table: &mut FeatureTable, histogram: &[f64]) -> Result<()> {
        let zero = vec![0.0; histogram.len()];
        let [buy, sell] = self.registry.macd_flip_keys();
        table.insert_bool(
            &buy,
            RelationSpec::evaluate(Relation::CrossUp, histogram, &zero),
        )?;
        table.insert_bool(
            &sell,
            RelationSpec::evaluate(Relation::CrossDown, histogram, &zero),
        )?;
        Ok(())
    }
}

fn add_composites(
    table: &mut FeatureTable,
    close: &[f64],
    period: usize,
    rsi: &[f64],
    histogram: &[f64],
    macd_signal: &[f64],
) -> Result<()> {
    use registry::named;

    let lowest = math::rolling_min(close, period);
    let highest = math::rolling_max(close, period);
    let pct = math::pct_change(close);
    let len = close.len();

    let columns = [
        (
            named::IS_SUPPORT,
            ColumnData::Bool((0..len).map(|t| close[t] == lowest[t]).collect()),
        ),
        (
            named::IS_RESISTANCE,
            ColumnData::Bool((0..len).map(|t| close[t] == highest[t]).collect()),
        ),
        (
            named::MOMENTUM_POSITIVE,
            ColumnData::Bool(pct.iter().map(|&p| p > 0.0).collect()),
        ),
        (
            named::MOMENTUM_NEGATIVE,
            ColumnData::Bool(pct.iter().map(|&p| p < 0.0).collect()),
        ),
        (
            named::TREND_REVERSAL,
            ColumnData::Bool(
                (0..len)
                    .map(|t| t >= 1 && pct[t - 1] * pct[t] < 0.0)
                    .collect(),
            ),
        ),
        (
            named::RSI_MACD_RATIO,
            ColumnData::Float(
                (0..len)
                    .map(|t| rsi[t] / (histogram[t] + RATIO_EPSILON))
                    .collect(),
            ),
        ),
        (
            named::MACD_SIGNAL_DIFF,
            ColumnData::Float((0..len).map(|t| macd_signal[t] - histogram[t]).collect()),
        ),
    ];
    for (name, data) in columns {
        table.insert(FeatureKey::Named(name).to_string(), data)?;
    }
    Ok(())
}

/// Compute the feature table with a one-off engine
pub fn compute_indicators(series: &KlineSeries, settings: &IndicatorSettings) -> Result<FeatureTable> {
    IndicatorEngine::new(settings.clone()).compute(series)
}
