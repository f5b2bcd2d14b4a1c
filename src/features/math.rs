//! Series math for indicators
//!
//! Every function returns a vector as long as its input. Positions without
//! enough history hold NaN; ratios with a zero denominator hold 0.

/// Percent change from `base` to `value`, 0 when the base is zero.
pub fn safe_pct(value: f64, base: f64) -> f64 {
    if base == 0.0 {
        0.0
    } else {
        (value - base) * 100.0 / base
    }
}

/// `x[t] - x[t-1]`
pub fn diff(x: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; x.len()];
    for t in 1..x.len() {
        out[t] = x[t] - x[t - 1];
    }
    out
}

/// Percent change against the previous row
pub fn pct_change(x: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; x.len()];
    for t in 1..x.len() {
        if x[t].is_nan() || x[t - 1].is_nan() {
            continue;
        }
        out[t] = safe_pct(x[t], x[t - 1]);
    }
    out
}

/// Value `n` rows back
pub fn lag(x: &[f64], n: usize) -> Vec<f64> {
    (0..x.len())
        .map(|t| if t >= n { x[t - n] } else { f64::NAN })
        .collect()
}

/// Apply `f` to every full trailing window without NaN.
fn rolling<F>(x: &[f64], n: usize, f: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut out = vec![f64::NAN; x.len()];
    if n == 0 {
        return out;
    }
    for t in (n - 1)..x.len() {
        let window = &x[t + 1 - n..=t];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        out[t] = f(window);
    }
    out
}

pub fn rolling_mean(x: &[f64], n: usize) -> Vec<f64> {
    rolling(x, n, |w| w.iter().sum::<f64>() / w.len() as f64)
}

pub fn rolling_sum(x: &[f64], n: usize) -> Vec<f64> {
    rolling(x, n, |w| w.iter().sum())
}

pub fn rolling_max(x: &[f64], n: usize) -> Vec<f64> {
    rolling(x, n, |w| w.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

pub fn rolling_min(x: &[f64], n: usize) -> Vec<f64> {
    rolling(x, n, |w| w.iter().copied().fold(f64::INFINITY, f64::min))
}

/// Population standard deviation
pub fn rolling_std(x: &[f64], n: usize) -> Vec<f64> {
    rolling(x, n, |w| {
        let mean = w.iter().sum::<f64>() / w.len() as f64;
        let var = w.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / w.len() as f64;
        var.sqrt()
    })
}

/// Exponential moving average seeded with the SMA of the first `n` valid values.
pub fn ema(x: &[f64], n: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; x.len()];
    if n == 0 {
        return out;
    }
    let Some(first) = x.iter().position(|v| !v.is_nan()) else {
        return out;
    };
    let seed_end = first + n - 1;
    if seed_end >= x.len() {
        return out;
    }

    let k = 2.0 / (n as f64 + 1.0);
    let mut prev = x[first..=seed_end].iter().sum::<f64>() / n as f64;
    out[seed_end] = prev;
    for t in (seed_end + 1)..x.len() {
        prev = x[t] * k + prev * (1.0 - k);
        out[t] = prev;
    }
    out
}

/// Wilder smoothing step
fn wilder(prev: f64, value: f64, n: usize) -> f64 {
    (prev * (n as f64 - 1.0) + value) / n as f64
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_gain + avg_loss == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// RSI with Wilder's smoothing
pub fn rsi(close: &[f64], n: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; close.len()];
    if n == 0 || close.len() <= n {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for t in 1..=n {
        let change = close[t] - close[t - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= n as f64;
    avg_loss /= n as f64;
    out[n] = rsi_from_averages(avg_gain, avg_loss);

    for t in (n + 1)..close.len() {
        let change = close[t] - close[t - 1];
        avg_gain = wilder(avg_gain, change.max(0.0), n);
        avg_loss = wilder(avg_loss, (-change).max(0.0), n);
        out[t] = rsi_from_averages(avg_gain, avg_loss);
    }
    out
}

/// True range; the first row falls back to high - low
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    (0..close.len())
        .map(|t| {
            let hl = high[t] - low[t];
            if t == 0 {
                return hl;
            }
            let hc = (high[t] - close[t - 1]).abs();
            let lc = (low[t] - close[t - 1]).abs();
            hl.max(hc).max(lc)
        })
        .collect()
}

/// Average true range with Wilder's smoothing
pub fn atr(high: &[f64], low: &[f64], close: &[f64], n: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; close.len()];
    if n == 0 || close.len() <= n {
        return out;
    }
    let tr = true_range(high, low, close);
    let mut prev = tr[1..=n].iter().sum::<f64>() / n as f64;
    out[n] = prev;
    for t in (n + 1)..close.len() {
        prev = wilder(prev, tr[t], n);
        out[t] = prev;
    }
    out
}

/// Directional movement system output
#[derive(Debug, Clone)]
pub struct Directional {
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
    pub adx: Vec<f64>,
}

/// +DI, -DI and ADX (Wilder)
pub fn directional(high: &[f64], low: &[f64], close: &[f64], n: usize) -> Directional {
    let len = close.len();
    let mut plus_di = vec![f64::NAN; len];
    let mut minus_di = vec![f64::NAN; len];
    let mut adx = vec![f64::NAN; len];
    if n == 0 || len <= n {
        return Directional {
            plus_di,
            minus_di,
            adx,
        };
    }

    let tr = true_range(high, low, close);
    let mut plus_dm = vec![0.0; len];
    let mut minus_dm = vec![0.0; len];
    for t in 1..len {
        let up = high[t] - high[t - 1];
        let down = low[t - 1] - low[t];
        if up > down && up > 0.0 {
            plus_dm[t] = up;
        }
        if down > up && down > 0.0 {
            minus_dm[t] = down;
        }
    }

    let mut s_tr: f64 = tr[1..=n].iter().sum();
    let mut s_plus: f64 = plus_dm[1..=n].iter().sum();
    let mut s_minus: f64 = minus_dm[1..=n].iter().sum();
    let mut dx = vec![f64::NAN; len];

    for t in n..len {
        if t > n {
            s_tr = s_tr - s_tr / n as f64 + tr[t];
            s_plus = s_plus - s_plus / n as f64 + plus_dm[t];
            s_minus = s_minus - s_minus / n as f64 + minus_dm[t];
        }
        let (p, m) = if s_tr == 0.0 {
            (0.0, 0.0)
        } else {
            (100.0 * s_plus / s_tr, 100.0 * s_minus / s_tr)
        };
        plus_di[t] = p;
        minus_di[t] = m;
        dx[t] = if p + m == 0.0 {
            0.0
        } else {
            100.0 * (p - m).abs() / (p + m)
        };
    }

    let first_adx = 2 * n - 1;
    if first_adx < len {
        let mut prev = dx[n..=first_adx].iter().sum::<f64>() / n as f64;
        adx[first_adx] = prev;
        for t in (first_adx + 1)..len {
            prev = wilder(prev, dx[t], n);
            adx[t] = prev;
        }
    }

    Directional {
        plus_di,
        minus_di,
        adx,
    }
}

pub fn typical_price(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    (0..close.len())
        .map(|t| (high[t] + low[t] + close[t]) / 3.0)
        .collect()
}

/// Commodity channel index
pub fn cci(high: &[f64], low: &[f64], close: &[f64], n: usize) -> Vec<f64> {
    let tp = typical_price(high, low, close);
    rolling(&tp, n, |w| {
        let mean = w.iter().sum::<f64>() / w.len() as f64;
        let mean_dev = w.iter().map(|v| (v - mean).abs()).sum::<f64>() / w.len() as f64;
        let last = w[w.len() - 1];
        if mean_dev == 0.0 {
            0.0
        } else {
            (last - mean) / (0.015 * mean_dev)
        }
    })
}

/// Money flow index
pub fn mfi(high: &[f64], low: &[f64], close: &[f64], volume: &[f64], n: usize) -> Vec<f64> {
    let len = close.len();
    let mut out = vec![f64::NAN; len];
    if n == 0 || len <= n {
        return out;
    }
    let tp = typical_price(high, low, close);
    let mut positive = vec![0.0; len];
    let mut negative = vec![0.0; len];
    for t in 1..len {
        let flow = tp[t] * volume[t];
        if tp[t] > tp[t - 1] {
            positive[t] = flow;
        } else if tp[t] < tp[t - 1] {
            negative[t] = flow;
        }
    }
    for t in n..len {
        let pos: f64 = positive[t + 1 - n..=t].iter().sum();
        let neg: f64 = negative[t + 1 - n..=t].iter().sum();
        out[t] = rsi_from_averages(pos, neg);
    }
    out
}

/// Position of `x` within its trailing `n`-row range, 0..100 (0 for a flat range)
fn range_position(x: &[f64], low: &[f64], high: &[f64], n: usize) -> Vec<f64> {
    let highest = rolling_max(high, n);
    let lowest = rolling_min(low, n);
    (0..x.len())
        .map(|t| {
            let range = highest[t] - lowest[t];
            if range.is_nan() || x[t].is_nan() {
                f64::NAN
            } else if range == 0.0 {
                0.0
            } else {
                100.0 * (x[t] - lowest[t]) / range
            }
        })
        .collect()
}

/// Slow stochastic (%K, %D)
pub fn stochastic(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    fastk: usize,
    slowk: usize,
    slowd: usize,
) -> (Vec<f64>, Vec<f64>) {
    let fast_k = range_position(close, low, high, fastk);
    let k = rolling_mean(&fast_k, slowk);
    let d = rolling_mean(&k, slowd);
    (k, d)
}

/// Stochastic RSI (%K, %D)
pub fn stoch_rsi(close: &[f64], period: usize, fastk: usize, fastd: usize) -> (Vec<f64>, Vec<f64>) {
    let r = rsi(close, period);
    let k = range_position(&r, &r, &r, fastk);
    let d = rolling_mean(&k, fastd);
    (k, d)
}

#[derive(Debug, Clone)]
pub struct Macd {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(close: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let fast_ema = ema(close, fast);
    let slow_ema = ema(close, slow);
    let line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();
    let signal = ema(&line, signal);
    let histogram = line.iter().zip(&signal).map(|(l, s)| l - s).collect();
    Macd {
        line,
        signal,
        histogram,
    }
}

#[derive(Debug, Clone)]
pub struct Bands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger(close: &[f64], n: usize, nbdev: f64) -> Bands {
    let middle = rolling_mean(close, n);
    let std = rolling_std(close, n);
    let upper = middle.iter().zip(&std).map(|(m, s)| m + nbdev * s).collect();
    let lower = middle.iter().zip(&std).map(|(m, s)| m - nbdev * s).collect();
    Bands {
        upper,
        middle,
        lower,
    }
}

/// Cumulative VWAP from the first row of the slice
pub fn vwap(high: &[f64], low: &[f64], close: &[f64], volume: &[f64]) -> Vec<f64> {
    let tp = typical_price(high, low, close);
    let mut cum_pv = 0.0;
    let mut cum_v = 0.0;
    (0..close.len())
        .map(|t| {
            cum_pv += tp[t] * volume[t];
            cum_v += volume[t];
            if cum_v == 0.0 {
                0.0
            } else {
                cum_pv / cum_v
            }
        })
        .collect()
}

/// Parabolic SAR
pub fn parabolic_sar(high: &[f64], low: &[f64], acceleration: f64, maximum: f64) -> Vec<f64> {
    let len = high.len();
    let mut out = vec![f64::NAN; len];
    if len < 2 {
        return out;
    }

    // Initial direction from the first bar's directional movement
    let down_move = low[0] - low[1];
    let up_move = high[1] - high[0];
    let mut long = !(down_move > 0.0 && down_move > up_move);
    let (mut sar, mut extreme) = if long {
        (low[0], high[1].max(high[0]))
    } else {
        (high[0], low[1].min(low[0]))
    };
    let mut af = acceleration;
    out[1] = sar;

    for t in 2..len {
        sar += af * (extreme - sar);
        if long {
            sar = sar.min(low[t - 1]).min(low[t - 2]);
            if low[t] < sar {
                long = false;
                sar = extreme;
                extreme = low[t];
                af = acceleration;
            } else if high[t] > extreme {
                extreme = high[t];
                af = (af + acceleration).min(maximum);
            }
        } else {
            sar = sar.max(high[t - 1]).max(high[t - 2]);
            if high[t] > sar {
                long = true;
                sar = extreme;
                extreme = high[t];
                af = acceleration;
            } else if low[t] < extreme {
                extreme = low[t];
                af = (af + acceleration).min(maximum);
            }
        }
        out[t] = sar;
    }
    out
}

/// `a` moved from at-or-below `b` to above it on row `t`
pub fn crossed_above(a: &[f64], b: &[f64], t: usize) -> bool {
    t > 0 && a[t - 1] <= b[t - 1] && a[t] > b[t]
}

/// `a` moved from at-or-above `b` to below it on row `t`
pub fn crossed_below(a: &[f64], b: &[f64], t: usize) -> bool {
    t > 0 && a[t - 1] >= b[t - 1] && a[t] < b[t]
}
