//! Post-run performance metrics (spec §4.6): returns, risk, trade stats,
//! time analysis, and the "advanced" risk measures, computed from the
//! journal + equity curve over the *logical* date range (warm-up bars are
//! carried in the equity history but excluded from every statistic here —
//! spec §9's resolved open question, see DESIGN.md).
//!
//! Decimal stays exact for money (total return, drawdown amount, trade
//! P&L); the statistical accumulators (Sharpe/Sortino/Omega/VaR/CVaR/Ulcer
//! denominators) convert to `f64` once at this module's boundary, per
//! spec §9's float-for-statistics guidance.

use crate::engine::BacktestResult;
use crate::journal::{Decision, JournalRow};
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Bar timeframe, used only to pick the annualisation factor (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    Daily,
    Weekly,
    Monthly,
    Hourly,
}

impl Timeframe {
    pub fn annualization_factor(self) -> f64 {
        match self {
            Timeframe::Daily => 252.0,
            Timeframe::Weekly => 52.0,
            Timeframe::Monthly => 12.0,
            Timeframe::Hourly => 252.0 * 6.5,
        }
    }
}

/// A synthesized round-trip: from a position's opening buy to the sell that
/// brings it back to flat. The engine journals individual fills, not
/// trades, so metrics reconstructs this by replaying the journal with the
/// same weighted-average-cost rule the portfolio itself uses.
#[derive(Debug, Clone)]
struct ClosedTrade {
    realized_pnl: Decimal,
    opened_at: DateTime<Utc>,
    closed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct SymbolLot {
    quantity: Decimal,
    avg_cost: Decimal,
    opened_at: Option<DateTime<Utc>>,
    pnl_since_open: Decimal,
}

fn derive_trades(journal: &[JournalRow]) -> Vec<ClosedTrade> {
    let mut lots: BTreeMap<String, SymbolLot> = BTreeMap::new();
    let mut trades = Vec::new();

    for row in journal {
        let Some(fill_price) = row.fill_price else { continue };
        if row.shares == 0 {
            continue;
        }
        let shares = Decimal::from(row.shares);
        let lot = lots.entry(row.symbol.clone()).or_default();

        match row.decision {
            Decision::Buy => {
                if lot.quantity == Decimal::ZERO {
                    lot.opened_at = Some(row.timestamp);
                    lot.pnl_since_open = Decimal::ZERO;
                }
                let total = lot.quantity + shares;
                if total > Decimal::ZERO {
                    lot.avg_cost = (lot.avg_cost * lot.quantity + fill_price * shares) / total;
                }
                lot.quantity = total;
            }
            Decision::Sell => {
                let sold = shares.min(lot.quantity.max(Decimal::ZERO));
                let pnl = sold * (fill_price - lot.avg_cost) - row.commission;
                lot.pnl_since_open += pnl;
                lot.quantity -= sold;

                if lot.quantity <= Decimal::ZERO {
                    if let Some(opened_at) = lot.opened_at.take() {
                        trades.push(ClosedTrade {
                            realized_pnl: lot.pnl_since_open,
                            opened_at,
                            closed_at: row.timestamp,
                        });
                    }
                    lot.quantity = Decimal::ZERO;
                    lot.pnl_since_open = Decimal::ZERO;
                }
            }
            Decision::Hold => {}
        }
    }

    trades
}

/// Full performance report for a backtest run (spec §4.6).
#[derive(Debug, Clone)]
pub struct Metrics {
    /// Set when equity history was empty; every field below is then zero.
    pub warning: Option<String>,

    // Returns
    pub total_return: Decimal,
    pub cagr: f64,
    pub annualized_mean_return: f64,

    // Risk
    pub annualized_volatility: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    pub max_drawdown_amount: Decimal,
    pub max_drawdown_pct: f64,
    pub drawdown_duration_days: i64,
    pub recovery_date: Option<DateTime<Utc>>,

    // Trade stats
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: Decimal,
    pub avg_loss: Decimal,
    pub largest_win: Decimal,
    pub largest_loss: Decimal,
    pub avg_holding_period_days: f64,

    // Time analysis
    pub monthly_returns: BTreeMap<(i32, u32), Decimal>,
    pub yearly_returns: BTreeMap<i32, Decimal>,
    pub rolling_sharpe: Vec<Option<f64>>,

    // Advanced
    pub omega_ratio: f64,
    pub var_95: f64,
    pub var_99: f64,
    pub cvar_95: f64,
    pub cvar_99: f64,
    pub ulcer_index: f64,
}

impl Metrics {
    fn empty(warning: impl Into<String>) -> Metrics {
        Metrics {
            warning: Some(warning.into()),
            total_return: Decimal::ZERO,
            cagr: 0.0,
            annualized_mean_return: 0.0,
            annualized_volatility: 0.0,
            sharpe: 0.0,
            sortino: 0.0,
            calmar: 0.0,
            max_drawdown_amount: Decimal::ZERO,
            max_drawdown_pct: 0.0,
            drawdown_duration_days: 0,
            recovery_date: None,
            total_trades: 0,
            wins: 0,
            losses: 0,
            win_rate: 0.0,
            profit_factor: 0.0,
            avg_win: Decimal::ZERO,
            avg_loss: Decimal::ZERO,
            largest_win: Decimal::ZERO,
            largest_loss: Decimal::ZERO,
            avg_holding_period_days: 0.0,
            monthly_returns: BTreeMap::new(),
            yearly_returns: BTreeMap::new(),
            rolling_sharpe: Vec::new(),
            omega_ratio: 0.0,
            var_95: 0.0,
            var_99: 0.0,
            cvar_95: 0.0,
            cvar_99: 0.0,
            ulcer_index: 0.0,
        }
    }
}

/// Compute the full metrics report from a [`BacktestResult`] (spec §4.6).
///
/// Restricted to `result.metadata.logical_start..` — warm-up bars remain in
/// `result.equity_history` for charting but are excluded here.
pub fn compute_metrics(result: &BacktestResult, initial_capital: Decimal, timeframe: Timeframe, risk_free_rate: f64) -> Metrics {
    let logical_start = result.metadata.logical_start;
    let equity: Vec<&crate::portfolio::EquityPoint> = result
        .equity_history
        .iter()
        .filter(|p| logical_start.map(|start| p.timestamp >= start).unwrap_or(true))
        .collect();

    if equity.is_empty() {
        return Metrics::empty("no equity history in logical range");
    }

    let journal: Vec<&JournalRow> = result
        .journal
        .iter()
        .filter(|r| logical_start.map(|start| r.timestamp >= start).unwrap_or(true))
        .collect();

    let curve: Vec<Decimal> = equity.iter().map(|p| p.equity).collect();
    let last_equity = *curve.last().unwrap();
    let total_return = if initial_capital > Decimal::ZERO {
        (last_equity - initial_capital) / initial_capital
    } else {
        Decimal::ZERO
    };

    let years = {
        let first_ts = equity.first().unwrap().timestamp;
        let last_ts = equity.last().unwrap().timestamp;
        (last_ts - first_ts).num_days() as f64 / 365.25
    };

    let initial_f = initial_capital.to_f64().unwrap_or(0.0);
    let last_f = last_equity.to_f64().unwrap_or(0.0);
    let cagr = calculate_cagr(initial_f, last_f, years);

    let daily_returns = period_returns(&curve);
    let ann_factor = timeframe.annualization_factor();
    let mean_return = mean(&daily_returns);
    let annualized_mean_return = mean_return * ann_factor;
    let annualized_volatility = std_dev(&daily_returns, mean_return) * ann_factor.sqrt();

    let rf_period = risk_free_rate / ann_factor;
    let sharpe = calculate_sharpe(&daily_returns, rf_period, ann_factor);
    let sortino = calculate_sortino(&daily_returns, rf_period, ann_factor);

    let (max_dd_amount, max_dd_pct, dd_duration_days, recovery_date) = drawdown_stats(&equity);
    let calmar = if max_dd_pct > 0.0 { cagr / max_dd_pct } else { 0.0 };

    let trades = derive_trades(&journal);
    let (total_trades, wins, losses, win_rate, profit_factor, avg_win, avg_loss, largest_win, largest_loss, avg_holding_period_days) =
        trade_stats(&trades);

    let monthly_returns = monthly_returns_from(&equity, initial_capital);
    let yearly_returns = yearly_returns_from(&equity, initial_capital);
    let rolling_sharpe = rolling_sharpe(&daily_returns, 252.min(daily_returns.len().max(1)), rf_period);

    let omega_ratio = calculate_omega(&daily_returns, 0.0);
    let (var_95, cvar_95) = historical_var(&daily_returns, 0.95);
    let (var_99, cvar_99) = historical_var(&daily_returns, 0.99);
    let ulcer_index = calculate_ulcer_index(&curve);

    Metrics {
        warning: None,
        total_return,
        cagr,
        annualized_mean_return,
        annualized_volatility,
        sharpe,
        sortino,
        calmar,
        max_drawdown_amount: max_dd_amount,
        max_drawdown_pct: max_dd_pct,
        drawdown_duration_days: dd_duration_days,
        recovery_date,
        total_trades,
        wins,
        losses,
        win_rate,
        profit_factor,
        avg_win,
        avg_loss,
        largest_win,
        largest_loss,
        avg_holding_period_days,
        monthly_returns,
        yearly_returns,
        rolling_sharpe,
        omega_ratio,
        var_95,
        var_99,
        cvar_95,
        cvar_99,
        ulcer_index,
    }
}

/// Per-period simple returns from an equity curve (`f64` boundary).
fn period_returns(curve: &[Decimal]) -> Vec<f64> {
    curve
        .windows(2)
        .filter_map(|w| {
            let prev = w[0].to_f64()?;
            let cur = w[1].to_f64()?;
            if prev == 0.0 {
                None
            } else {
                Some((cur - prev) / prev)
            }
        })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64], mean_value: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean_value).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// CAGR from initial/final value over a span of years.
pub fn calculate_cagr(initial: f64, final_value: f64, years: f64) -> f64 {
    if initial <= 0.0 || years <= 0.0 || final_value <= 0.0 {
        return 0.0;
    }
    (final_value / initial).powf(1.0 / years) - 1.0
}

/// Annualized Sharpe ratio using a per-period risk-free rate (spec: 2%/yr default).
pub fn calculate_sharpe(returns: &[f64], rf_period: f64, ann_factor: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let excess: Vec<f64> = returns.iter().map(|r| r - rf_period).collect();
    let m = mean(&excess);
    let sd = std_dev(&excess, m);
    if sd == 0.0 {
        return 0.0;
    }
    (m * ann_factor) / (sd * ann_factor.sqrt())
}

/// Annualized Sortino ratio: like Sharpe but only downside deviation penalizes.
pub fn calculate_sortino(returns: &[f64], rf_period: f64, ann_factor: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let excess: Vec<f64> = returns.iter().map(|r| r - rf_period).collect();
    let m = mean(&excess);
    let downside_variance = excess.iter().map(|r| if *r < 0.0 { r.powi(2) } else { 0.0 }).sum::<f64>() / excess.len() as f64;
    let downside_dev = downside_variance.sqrt();
    if downside_dev == 0.0 {
        return 0.0;
    }
    (m * ann_factor) / (downside_dev * ann_factor.sqrt())
}

/// Max drawdown amount/pct, its duration in calendar days, and the date
/// equity recovered to the prior peak (if it ever did).
fn drawdown_stats(equity: &[&crate::portfolio::EquityPoint]) -> (Decimal, f64, i64, Option<DateTime<Utc>>) {
    let mut peak = equity[0].equity;
    let mut peak_ts = equity[0].timestamp;
    let mut max_dd_amount = Decimal::ZERO;
    let mut max_dd_pct = 0.0f64;
    let mut worst_peak_ts = peak_ts;
    let mut worst_trough_ts = peak_ts;
    let mut recovery_date = None;
    let mut in_drawdown_from: Option<DateTime<Utc>> = None;

    for point in equity {
        if point.equity >= peak {
            peak = point.equity;
            peak_ts = point.timestamp;
            in_drawdown_from = None;
        } else {
            if in_drawdown_from.is_none() {
                in_drawdown_from = Some(peak_ts);
            }
            let dd_amount = peak - point.equity;
            let dd_pct = if peak > Decimal::ZERO {
                (dd_amount / peak).to_f64().unwrap_or(0.0)
            } else {
                0.0
            };
            if dd_amount > max_dd_amount {
                max_dd_amount = dd_amount;
                max_dd_pct = dd_pct;
                worst_peak_ts = peak_ts;
                worst_trough_ts = point.timestamp;
            }
        }
    }

    // Recovery date: first timestamp after the worst trough at which equity
    // climbs back to (or above) the pre-drawdown peak.
    if max_dd_amount > Decimal::ZERO {
        let peak_value = equity
            .iter()
            .find(|p| p.timestamp == worst_peak_ts)
            .map(|p| p.equity)
            .unwrap_or(Decimal::ZERO);
        for point in equity {
            if point.timestamp > worst_trough_ts && point.equity >= peak_value {
                recovery_date = Some(point.timestamp);
                break;
            }
        }
    }

    let duration_days = if max_dd_amount > Decimal::ZERO {
        (worst_trough_ts - worst_peak_ts).num_days()
    } else {
        0
    };

    (max_dd_amount, max_dd_pct, duration_days, recovery_date)
}

#[allow(clippy::type_complexity)]
fn trade_stats(trades: &[ClosedTrade]) -> (usize, usize, usize, f64, f64, Decimal, Decimal, Decimal, Decimal, f64) {
    if trades.is_empty() {
        return (0, 0, 0, 0.0, 0.0, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, 0.0);
    }

    let wins: Vec<Decimal> = trades.iter().filter(|t| t.realized_pnl > Decimal::ZERO).map(|t| t.realized_pnl).collect();
    let losses: Vec<Decimal> = trades.iter().filter(|t| t.realized_pnl < Decimal::ZERO).map(|t| t.realized_pnl).collect();

    let total_trades = trades.len();
    let win_count = wins.len();
    let loss_count = losses.len();
    let win_rate = win_count as f64 / total_trades as f64;

    let gross_profit: Decimal = wins.iter().copied().sum();
    let gross_loss: Decimal = losses.iter().copied().sum::<Decimal>().abs();
    let profit_factor = if gross_loss > Decimal::ZERO {
        (gross_profit / gross_loss).to_f64().unwrap_or(0.0)
    } else if gross_profit > Decimal::ZERO {
        f64::INFINITY
    } else {
        0.0
    };

    let avg_win = if win_count > 0 { gross_profit / Decimal::from(win_count) } else { Decimal::ZERO };
    let avg_loss = if loss_count > 0 { losses.iter().copied().sum::<Decimal>() / Decimal::from(loss_count) } else { Decimal::ZERO };
    let largest_win = wins.iter().copied().fold(Decimal::ZERO, Decimal::max);
    let largest_loss = losses.iter().copied().fold(Decimal::ZERO, Decimal::min);

    let total_holding_days: i64 = trades.iter().map(|t| (t.closed_at - t.opened_at).num_days()).sum();
    let avg_holding_period_days = total_holding_days as f64 / total_trades as f64;

    (
        total_trades,
        win_count,
        loss_count,
        win_rate,
        profit_factor,
        avg_win,
        avg_loss,
        largest_win,
        largest_loss,
        avg_holding_period_days,
    )
}

fn monthly_returns_from(equity: &[&crate::portfolio::EquityPoint], initial_capital: Decimal) -> BTreeMap<(i32, u32), Decimal> {
    period_returns_by_key(equity, initial_capital, |ts| (ts.year(), ts.month()))
}

fn yearly_returns_from(equity: &[&crate::portfolio::EquityPoint], initial_capital: Decimal) -> BTreeMap<i32, Decimal> {
    period_returns_by_key(equity, initial_capital, |ts| ts.year())
}

/// Return-per-bucket: the fractional change in equity from the last bar of
/// the previous bucket (or `initial_capital` for the first bucket) to the
/// last bar of this bucket.
fn period_returns_by_key<K: Ord + Copy>(
    equity: &[&crate::portfolio::EquityPoint],
    initial_capital: Decimal,
    key_fn: impl Fn(DateTime<Utc>) -> K,
) -> BTreeMap<K, Decimal> {
    let mut last_in_bucket: BTreeMap<K, Decimal> = BTreeMap::new();
    for point in equity {
        last_in_bucket.insert(key_fn(point.timestamp), point.equity);
    }

    let mut out = BTreeMap::new();
    let mut prev = initial_capital;
    for (key, value) in last_in_bucket {
        let ret = if prev > Decimal::ZERO { (value - prev) / prev } else { Decimal::ZERO };
        out.insert(key, ret);
        prev = value;
    }
    out
}

/// Rolling Sharpe over a trailing window of daily returns (spec §4.6 "rolling
/// Sharpe, window configurable, default 252 bars for daily").
fn rolling_sharpe(returns: &[f64], window: usize, rf_period: f64) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; returns.len()];
    }
    let mut out = vec![None; returns.len()];
    for i in 0..returns.len() {
        if i + 1 < window {
            continue;
        }
        let slice = &returns[i + 1 - window..=i];
        out[i] = Some(calculate_sharpe(slice, rf_period, 252.0));
    }
    out
}

/// Omega ratio at a threshold return (default 0): ratio of the sum of gains
/// above the threshold to the sum of losses below it.
pub fn calculate_omega(returns: &[f64], threshold: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let gains: f64 = returns.iter().filter(|r| **r > threshold).map(|r| r - threshold).sum();
    let losses: f64 = returns.iter().filter(|r| **r < threshold).map(|r| threshold - r).sum();
    if losses == 0.0 {
        if gains > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    } else {
        gains / losses
    }
}

/// Historical VaR/CVaR at the given confidence (e.g. `0.95`): VaR is the
/// loss at that percentile of the empirical return distribution; CVaR is
/// the mean loss beyond it (expected shortfall). Both returned as positive
/// loss fractions.
fn historical_var(returns: &[f64], confidence: f64) -> (f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0);
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let tail_fraction = 1.0 - confidence;
    let idx = ((tail_fraction * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    let var = -sorted[idx];

    let tail = &sorted[..=idx];
    let cvar = if tail.is_empty() { var } else { -(tail.iter().sum::<f64>() / tail.len() as f64) };

    (var.max(0.0), cvar.max(0.0))
}

/// Ulcer index: RMS of percentage drawdowns from the running peak.
pub fn calculate_ulcer_index(curve: &[Decimal]) -> f64 {
    if curve.is_empty() {
        return 0.0;
    }
    let mut peak = curve[0];
    let mut sum_sq = 0.0;
    for &value in curve {
        if value > peak {
            peak = value;
        }
        let dd_pct = if peak > Decimal::ZERO { ((peak - value) / peak).to_f64().unwrap_or(0.0) * 100.0 } else { 0.0 };
        sum_sq += dd_pct * dd_pct;
    }
    (sum_sq / curve.len() as f64).sqrt()
}
