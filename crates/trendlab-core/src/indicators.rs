//! Technical indicators: pure, stateless functions over price/bar series.
//!
//! Key invariant: indicator value at index `t` must depend only on bars
//! `0..=t` (no lookahead). All arithmetic is `Decimal`; the one exception is
//! `bollinger_bands`' standard deviation, which has no cheap Decimal square
//! root and is computed at the `f64` boundary, per the documented
//! decimal/float split for statistical accumulators.

use crate::bar::Bar;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

fn dec(n: i64) -> Decimal {
    Decimal::from(n)
}

/// Simple moving average over a fixed window. `None` until the window fills.
pub fn sma(values: &[Decimal], period: usize) -> Vec<Option<Decimal>> {
    if period == 0 || values.is_empty() {
        return vec![None; values.len()];
    }

    let mut out = vec![None; values.len()];
    let mut sum = Decimal::ZERO;

    for i in 0..values.len() {
        sum += values[i];
        if i >= period {
            sum -= values[i - period];
        }
        if i + 1 >= period {
            out[i] = Some(sum / dec(period as i64));
        }
    }

    out
}

/// Simple moving average restricted to a run of already-computed optional
/// values; a window containing any `None` stays `None` (used to chain
/// indicators, e.g. smoothing a %K series into %D).
fn sma_of_optional(values: &[Option<Decimal>], period: usize) -> Vec<Option<Decimal>> {
    if period == 0 || values.is_empty() {
        return vec![None; values.len()];
    }

    let mut out = vec![None; values.len()];
    for i in 0..values.len() {
        if i + 1 < period {
            continue;
        }
        let window = &values[i + 1 - period..=i];
        if window.iter().all(|v| v.is_some()) {
            let sum: Decimal = window.iter().map(|v| v.unwrap()).sum();
            out[i] = Some(sum / dec(period as i64));
        }
    }
    out
}

/// Exponential moving average, seeded with the SMA of the first `period`
/// values (teacher convention).
pub fn ema(values: &[Decimal], period: usize) -> Vec<Option<Decimal>> {
    if period == 0 || values.is_empty() {
        return vec![None; values.len()];
    }

    let mut out = vec![None; values.len()];
    if values.len() < period {
        return out;
    }

    let k = dec(2) / dec(period as i64 + 1);
    let initial_sma: Decimal = values[..period].iter().sum::<Decimal>() / dec(period as i64);
    out[period - 1] = Some(initial_sma);

    let mut prev = initial_sma;
    for (i, value) in values.iter().enumerate().skip(period) {
        let cur = *value * k + prev * (Decimal::ONE - k);
        out[i] = Some(cur);
        prev = cur;
    }

    out
}

/// Weighted moving average: weights `1..=period`, most recent bar heaviest.
pub fn wma(values: &[Decimal], period: usize) -> Vec<Option<Decimal>> {
    if period == 0 || values.is_empty() {
        return vec![None; values.len()];
    }

    let denom = dec((period * (period + 1) / 2) as i64);
    let mut out = vec![None; values.len()];

    for i in 0..values.len() {
        if i + 1 < period {
            continue;
        }
        let window = &values[i + 1 - period..=i];
        let weighted: Decimal = window
            .iter()
            .enumerate()
            .map(|(w, v)| *v * dec((w + 1) as i64))
            .sum();
        out[i] = Some(weighted / denom);
    }

    out
}

/// Wilder-smoothed relative strength index. All-gains returns 100;
/// all-losses returns 0.
pub fn rsi(values: &[Decimal], period: usize) -> Vec<Option<Decimal>> {
    if period == 0 || values.len() < 2 {
        return vec![None; values.len()];
    }

    let mut out = vec![None; values.len()];
    let mut gains = Vec::with_capacity(values.len());
    let mut losses = Vec::with_capacity(values.len());
    gains.push(Decimal::ZERO);
    losses.push(Decimal::ZERO);
    for i in 1..values.len() {
        let change = values[i] - values[i - 1];
        gains.push(change.max(Decimal::ZERO));
        losses.push((-change).max(Decimal::ZERO));
    }

    if values.len() <= period {
        return out;
    }

    let mut avg_gain: Decimal = gains[1..=period].iter().sum::<Decimal>() / dec(period as i64);
    let mut avg_loss: Decimal = losses[1..=period].iter().sum::<Decimal>() / dec(period as i64);
    out[period] = Some(rsi_from_averages(avg_gain, avg_loss));

    for i in (period + 1)..values.len() {
        avg_gain = (avg_gain * dec(period as i64 - 1) + gains[i]) / dec(period as i64);
        avg_loss = (avg_loss * dec(period as i64 - 1) + losses[i]) / dec(period as i64);
        out[i] = Some(rsi_from_averages(avg_gain, avg_loss));
    }

    out
}

fn rsi_from_averages(avg_gain: Decimal, avg_loss: Decimal) -> Decimal {
    if avg_loss == Decimal::ZERO {
        return dec(100);
    }
    if avg_gain == Decimal::ZERO {
        return Decimal::ZERO;
    }
    let rs = avg_gain / avg_loss;
    dec(100) - dec(100) / (Decimal::ONE + rs)
}

/// MACD line/signal/histogram (12/26/9 default periods).
#[derive(Debug, Clone, PartialEq)]
pub struct Macd {
    pub line: Vec<Option<Decimal>>,
    pub signal: Vec<Option<Decimal>>,
    pub histogram: Vec<Option<Decimal>>,
}

pub fn macd(values: &[Decimal], fast: usize, slow: usize, signal_period: usize) -> Macd {
    let ema_fast = ema(values, fast);
    let ema_slow = ema(values, slow);

    let line: Vec<Option<Decimal>> = ema_fast
        .iter()
        .zip(ema_slow.iter())
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => Some(*f - *s),
            _ => None,
        })
        .collect();

    // MACD's signal line is conventionally an EMA of the MACD line, not an
    // SMA; reuse `ema` on the dense (post-warmup) subsequence and scatter
    // the result back into a full-length vector aligned with `line`.
    let first_defined = line.iter().position(Option::is_some);
    let signal = if let Some(start) = first_defined {
        let dense: Vec<Decimal> = line[start..].iter().map(|v| v.unwrap()).collect();
        let dense_ema = ema(&dense, signal_period);
        let mut out = vec![None; values.len()];
        for (i, v) in dense_ema.into_iter().enumerate() {
            out[start + i] = v;
        }
        out
    } else {
        vec![None; values.len()]
    };

    let histogram: Vec<Option<Decimal>> = line
        .iter()
        .zip(signal.iter())
        .map(|(l, s)| match (l, s) {
            (Some(l), Some(s)) => Some(*l - *s),
            _ => None,
        })
        .collect();

    Macd { line, signal, histogram }
}

/// Bollinger Bands (default period 20, 2 standard deviations).
#[derive(Debug, Clone, PartialEq)]
pub struct Bollinger {
    pub upper: Vec<Option<Decimal>>,
    pub middle: Vec<Option<Decimal>>,
    pub lower: Vec<Option<Decimal>>,
}

pub fn bollinger_bands(values: &[Decimal], period: usize, std_mult: Decimal) -> Bollinger {
    let middle = sma(values, period);
    let mut upper = vec![None; values.len()];
    let mut lower = vec![None; values.len()];

    for i in 0..values.len() {
        let Some(mean) = middle[i] else { continue };
        let window = &values[i + 1 - period..=i];
        let variance: Decimal = window.iter().map(|v| (*v - mean) * (*v - mean)).sum::<Decimal>() / dec(period as i64);
        let variance_f64 = variance.to_f64().unwrap_or(0.0).max(0.0);
        let std_dev = Decimal::from_f64(variance_f64.sqrt()).unwrap_or(Decimal::ZERO);
        upper[i] = Some(mean + std_mult * std_dev);
        lower[i] = Some(mean - std_mult * std_dev);
    }

    Bollinger { upper, middle, lower }
}

/// True Range for each bar. First bar's TR is `high - low` (no prior close).
pub fn true_range(bars: &[Bar]) -> Vec<Decimal> {
    if bars.is_empty() {
        return vec![];
    }

    let mut out = Vec::with_capacity(bars.len());
    out.push(bars[0].high - bars[0].low);

    for i in 1..bars.len() {
        let h = bars[i].high;
        let l = bars[i].low;
        let prev_c = bars[i - 1].close;
        let tr = (h - l).max((h - prev_c).abs()).max((l - prev_c).abs());
        out.push(tr);
    }

    out
}

/// Wilder-smoothed Average True Range (the only ATR this engine offers;
/// spec.md requires Wilder smoothing so there is no plain-SMA variant).
pub fn atr(bars: &[Bar], period: usize) -> Vec<Option<Decimal>> {
    if period == 0 || bars.is_empty() {
        return vec![None; bars.len()];
    }
    wilder_smooth(&true_range(bars), period)
}

/// Wilder's smoothing: first value is the simple average of the first
/// `period` entries; subsequent values recurse as
/// `prev * (period-1)/period + value/period`.
fn wilder_smooth(values: &[Decimal], period: usize) -> Vec<Option<Decimal>> {
    let mut out = vec![None; values.len()];
    if values.len() < period || period == 0 {
        return out;
    }

    let initial: Decimal = values[..period].iter().sum::<Decimal>() / dec(period as i64);
    out[period - 1] = Some(initial);

    let mut prev = initial;
    for (i, value) in values.iter().enumerate().skip(period) {
        let cur = (prev * dec(period as i64 - 1) + *value) / dec(period as i64);
        out[i] = Some(cur);
        prev = cur;
    }

    out
}

/// Stochastic oscillator: %K (smoothed) and %D.
#[derive(Debug, Clone, PartialEq)]
pub struct Stochastic {
    pub k: Vec<Option<Decimal>>,
    pub d: Vec<Option<Decimal>>,
}

pub fn stochastic(bars: &[Bar], k_period: usize, k_smooth: usize, d_period: usize) -> Stochastic {
    let n = bars.len();
    let mut raw_k = vec![None; n];

    for i in 0..n {
        if i + 1 < k_period {
            continue;
        }
        let window = &bars[i + 1 - k_period..=i];
        let highest = window.iter().map(|b| b.high).max().unwrap();
        let lowest = window.iter().map(|b| b.low).min().unwrap();
        let range = highest - lowest;
        let value = if range == Decimal::ZERO {
            dec(50)
        } else {
            (bars[i].close - lowest) / range * dec(100)
        };
        raw_k[i] = Some(value);
    }

    let k = sma_of_optional(&raw_k, k_smooth);
    let d = sma_of_optional(&k, d_period);

    Stochastic { k, d }
}

/// On-balance volume: cumulative signed volume flow.
pub fn obv(bars: &[Bar]) -> Vec<Decimal> {
    if bars.is_empty() {
        return vec![];
    }

    let mut out = Vec::with_capacity(bars.len());
    out.push(Decimal::ZERO);

    for i in 1..bars.len() {
        let volume = Decimal::from(bars[i].volume);
        let prev = out[i - 1];
        let next = if bars[i].close > bars[i - 1].close {
            prev + volume
        } else if bars[i].close < bars[i - 1].close {
            prev - volume
        } else {
            prev
        };
        out.push(next);
    }

    out
}

/// Average Directional Index with its +DI/-DI components.
#[derive(Debug, Clone, PartialEq)]
pub struct Adx {
    pub plus_di: Vec<Option<Decimal>>,
    pub minus_di: Vec<Option<Decimal>>,
    pub adx: Vec<Option<Decimal>>,
}

pub fn adx(bars: &[Bar], period: usize) -> Adx {
    let n = bars.len();
    if period == 0 || n < 2 {
        return Adx {
            plus_di: vec![None; n],
            minus_di: vec![None; n],
            adx: vec![None; n],
        };
    }

    let tr = true_range(bars);
    let mut plus_dm = vec![Decimal::ZERO; n];
    let mut minus_dm = vec![Decimal::ZERO; n];

    for i in 1..n {
        let up_move = bars[i].high - bars[i - 1].high;
        let down_move = bars[i - 1].low - bars[i].low;
        if up_move > down_move && up_move > Decimal::ZERO {
            plus_dm[i] = up_move;
        }
        if down_move > up_move && down_move > Decimal::ZERO {
            minus_dm[i] = down_move;
        }
    }

    let smoothed_tr = wilder_smooth(&tr, period);
    let smoothed_plus_dm = wilder_smooth(&plus_dm, period);
    let smoothed_minus_dm = wilder_smooth(&minus_dm, period);

    let mut plus_di = vec![None; n];
    let mut minus_di = vec![None; n];
    let mut dx = vec![None; n];

    for i in 0..n {
        if let (Some(str_), Some(spd), Some(smd)) = (smoothed_tr[i], smoothed_plus_dm[i], smoothed_minus_dm[i]) {
            if str_ == Decimal::ZERO {
                continue;
            }
            let pdi = dec(100) * spd / str_;
            let mdi = dec(100) * smd / str_;
            plus_di[i] = Some(pdi);
            minus_di[i] = Some(mdi);
            let sum = pdi + mdi;
            if sum != Decimal::ZERO {
                dx[i] = Some(dec(100) * (pdi - mdi).abs() / sum);
            } else {
                dx[i] = Some(Decimal::ZERO);
            }
        }
    }

    let first_dx = dx.iter().position(Option::is_some);
    let adx_values = if let Some(start) = first_dx {
        let dense: Vec<Decimal> = dx[start..].iter().map(|v| v.unwrap()).collect();
        let dense_adx = wilder_smooth(&dense, period);
        let mut out = vec![None; n];
        for (i, v) in dense_adx.into_iter().enumerate() {
            out[start + i] = v;
        }
        out
    } else {
        vec![None; n]
    };

    Adx {
        plus_di,
        minus_di,
        adx: adx_values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn bars_from_closes(closes: &[Decimal]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let ts = chrono::Utc.with_ymd_and_hms(2024, 1, 1 + i as u32, 0, 0, 0).unwrap();
                Bar::new("TEST", ts, c, c, c, c, 0).unwrap()
            })
            .collect()
    }

    fn bars_from_ohlc(ohlc: &[(Decimal, Decimal, Decimal, Decimal)]) -> Vec<Bar> {
        ohlc.iter()
            .enumerate()
            .map(|(i, &(o, h, l, c))| {
                let ts = chrono::Utc.with_ymd_and_hms(2024, 1, 1 + i as u32, 0, 0, 0).unwrap();
                Bar::new("TEST", ts, o, h, l, c, 0).unwrap()
            })
            .collect()
    }

    #[test]
    fn sma_window_3_matches_definition() {
        let values = vec![dec!(1), dec!(2), dec!(3), dec!(4)];
        let out = sma(&values, 3);
        assert_eq!(out, vec![None, None, Some(dec!(2)), Some(dec!(3))]);
    }

    #[test]
    fn sma_full_length_window_yields_single_value() {
        let values = vec![dec!(1), dec!(2), dec!(3)];
        let out = sma(&values, 3);
        assert_eq!(out, vec![None, None, Some(dec!(2))]);
    }

    #[test]
    fn ema_seeded_with_sma() {
        let values = vec![dec!(1), dec!(2), dec!(3), dec!(4)];
        let out = ema(&values, 3);
        assert!(out[0].is_none() && out[1].is_none());
        assert_eq!(out[2], Some(dec!(2)));
        // k = 2/4 = 0.5; ema[3] = 4*0.5 + 2*0.5 = 3
        assert_eq!(out[3], Some(dec!(3)));
    }

    #[test]
    fn wma_weights_recent_bars_more() {
        let values = vec![dec!(1), dec!(2), dec!(3)];
        let out = wma(&values, 3);
        // (1*1 + 2*2 + 3*3) / 6 = 14/6
        assert_eq!(out[2], Some(dec!(14) / dec!(6)));
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let values = vec![dec!(1), dec!(2), dec!(3), dec!(4), dec!(5)];
        let out = rsi(&values, 3);
        assert_eq!(out[3], Some(dec!(100)));
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let values = vec![dec!(5), dec!(4), dec!(3), dec!(2), dec!(1)];
        let out = rsi(&values, 3);
        assert_eq!(out[3], Some(Decimal::ZERO));
    }

    #[test]
    fn rsi_stays_in_bounds() {
        let values = vec![dec!(10), dec!(11), dec!(9), dec!(12), dec!(8), dec!(15), dec!(7)];
        let out = rsi(&values, 3);
        for v in out.into_iter().flatten() {
            assert!(v >= Decimal::ZERO && v <= dec!(100));
        }
    }

    #[test]
    fn macd_is_ema_fast_minus_ema_slow() {
        let values: Vec<Decimal> = (1..=40i64).map(dec).collect();
        let m = macd(&values, 5, 10, 3);
        let ema_fast = ema(&values, 5);
        let ema_slow = ema(&values, 10);
        for i in 0..values.len() {
            if let (Some(f), Some(s)) = (ema_fast[i], ema_slow[i]) {
                assert_eq!(m.line[i], Some(f - s));
            }
        }
    }

    #[test]
    fn true_range_with_gap_up() {
        let ohlc = vec![
            (dec!(98), dec!(102), dec!(96), dec!(100)),
            (dec!(110), dec!(115), dec!(108), dec!(112)),
        ];
        let bars = bars_from_ohlc(&ohlc);
        let tr = true_range(&bars);
        assert_eq!(tr[0], dec!(6));
        assert_eq!(tr[1], dec!(15));
    }

    #[test]
    fn atr_is_wilder_smoothed() {
        let ohlc = vec![
            (dec!(100), dec!(106), dec!(98), dec!(102)),
            (dec!(102), dec!(108), dec!(100), dec!(104)),
            (dec!(104), dec!(110), dec!(102), dec!(106)),
            (dec!(106), dec!(120), dec!(104), dec!(118)),
        ];
        let bars = bars_from_ohlc(&ohlc);
        let atr_vals = atr(&bars, 3);
        assert_eq!(atr_vals[2], Some(dec!(8)));
        // atr[3] = 8*(2/3) + 16*(1/3) = 10.666...
        let expected = (dec!(8) * dec!(2) + dec!(16)) / dec!(3);
        assert_eq!(atr_vals[3], Some(expected));
    }

    #[test]
    fn atr_positive_on_nonzero_range() {
        let bars = bars_from_ohlc(&[
            (dec!(100), dec!(101), dec!(99), dec!(100)),
            (dec!(100), dec!(101), dec!(99), dec!(100)),
        ]);
        let tr = true_range(&bars);
        assert!(tr.iter().all(|v| *v > Decimal::ZERO));
    }

    #[test]
    fn stochastic_bounded_0_100() {
        let bars = bars_from_ohlc(&[
            (dec!(100), dec!(105), dec!(95), dec!(102)),
            (dec!(102), dec!(108), dec!(100), dec!(107)),
            (dec!(107), dec!(110), dec!(104), dec!(105)),
            (dec!(105), dec!(106), dec!(95), dec!(96)),
        ]);
        let s = stochastic(&bars, 3, 1, 1);
        for v in s.k.into_iter().flatten() {
            assert!(v >= Decimal::ZERO && v <= dec!(100));
        }
    }

    #[test]
    fn obv_accumulates_with_close_direction() {
        let closes = vec![dec!(10), dec!(11), dec!(10), dec!(10)];
        let bars: Vec<Bar> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let ts = chrono::Utc.with_ymd_and_hms(2024, 1, 1 + i as u32, 0, 0, 0).unwrap();
                Bar::new("TEST", ts, c, c, c, c, 100).unwrap()
            })
            .collect();
        let out = obv(&bars);
        assert_eq!(out[0], Decimal::ZERO);
        assert_eq!(out[1], dec!(100));
        assert_eq!(out[2], Decimal::ZERO);
        assert_eq!(out[3], Decimal::ZERO);
    }

    #[test]
    fn adx_bounded_0_100() {
        let ohlc: Vec<(Decimal, Decimal, Decimal, Decimal)> = (0i64..20)
            .map(|i| {
                let base = dec(100 + i * 2);
                (base, base + dec!(3), base - dec!(3), base + dec!(1))
            })
            .collect();
        let bars = bars_from_ohlc(&ohlc);
        let a = adx(&bars, 5);
        for v in a.adx.into_iter().flatten() {
            assert!(v >= Decimal::ZERO && v <= dec!(100));
        }
    }

    #[test]
    fn no_lookahead_extreme_future_bar_does_not_move_earlier_sma() {
        let mut closes = vec![dec!(10), dec!(11), dec!(12), dec!(13)];
        let before = sma(&closes, 2);
        closes.push(dec!(10_000));
        let after = sma(&closes, 2);
        assert_eq!(before[1], after[1]);
        assert_eq!(before[2], after[2]);
        assert_eq!(before[3], after[3]);
    }

    #[test]
    fn bars_from_closes_helper_used() {
        let bars = bars_from_closes(&[dec!(1), dec!(2)]);
        assert_eq!(bars.len(), 2);
    }
}
