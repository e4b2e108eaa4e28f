//! Cash/position ledger: order execution, mark-to-market, trade journal.

use crate::bar::Bar;
use crate::error::TrendLabError;
use crate::fill::{Fill, FillReason};
use crate::journal::{Decision, JournalRow};
use crate::order::Order;
use crate::position::Position;
use crate::signal::{Side, Signal};
use crate::sizing::{resolve_percent, resolve_risk};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

/// When a batch's orders are filled against the bar's close, or deferred to
/// the following bar's open (spec §9 open question; default close-of-bar).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPolicy {
    CloseOfBar,
    NextBarOpen,
}

/// Resolved execution parameters the external caller (CLI or harness)
/// configures per run.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub fill_policy: FillPolicy,
    pub commission_per_share: Decimal,
    pub slippage_bps: i64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            fill_policy: FillPolicy::CloseOfBar,
            commission_per_share: Decimal::new(1, 2), // 0.01
            slippage_bps: 0,
        }
    }
}

/// One entry in the portfolio's equity curve.
#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: Decimal,
}

/// The cash/position ledger. Owns all mutable backtest state; the event loop
/// is the only caller that drives mutation.
#[derive(Debug, Clone)]
pub struct Portfolio {
    pub cash: Decimal,
    pub positions: BTreeMap<String, Position>,
    pub trade_journal: Vec<JournalRow>,
    pub equity_history: Vec<EquityPoint>,
    next_trade_id: u64,
}

impl Portfolio {
    pub fn new(initial_cash: Decimal) -> Portfolio {
        Portfolio {
            cash: initial_cash,
            positions: BTreeMap::new(),
            trade_journal: Vec::new(),
            equity_history: Vec::new(),
            next_trade_id: 1,
        }
    }

    /// Total equity: cash plus mark-to-market value of every open position.
    pub fn mark_to_market(&self, closes: &HashMap<String, Decimal>) -> Decimal {
        let positions_value: Decimal = self
            .positions
            .values()
            .map(|p| {
                let close = closes.get(&p.symbol).copied().unwrap_or(p.avg_entry_price);
                p.market_value(close)
            })
            .sum();
        self.cash + positions_value
    }

    /// `{symbol -> value_fraction, CASH -> cash_fraction}`, iterated in
    /// symbol order (BTreeMap) so output is deterministic without sorting.
    pub fn allocation_snapshot(&self, closes: &HashMap<String, Decimal>) -> BTreeMap<String, Decimal> {
        let total = self.mark_to_market(closes);
        let mut snapshot = BTreeMap::new();
        if total == Decimal::ZERO {
            return snapshot;
        }
        for p in self.positions.values() {
            let close = closes.get(&p.symbol).copied().unwrap_or(p.avg_entry_price);
            snapshot.insert(p.symbol.clone(), p.market_value(close) / total);
        }
        snapshot.insert("CASH".to_string(), self.cash / total);
        snapshot
    }

    pub fn record_equity(&mut self, timestamp: DateTime<Utc>, closes: &HashMap<String, Decimal>) {
        let equity = self.mark_to_market(closes);
        self.equity_history.push(EquityPoint { timestamp, equity });
    }

    /// Check open positions' stop prices against the bar's low (longs) before
    /// signals for that bar are processed. Synthesizes a stop-triggered exit
    /// fill and removes the position on breach.
    pub fn apply_stop_losses(&mut self, bars_by_symbol: &HashMap<String, &Bar>) -> Vec<Fill> {
        let mut fills = Vec::new();
        let breached: Vec<(String, Decimal, DateTime<Utc>, i64)> = self
            .positions
            .values()
            .filter_map(|p| {
                let stop = p.stop_price?;
                let bar = bars_by_symbol.get(&p.symbol)?;
                if p.quantity > 0 && bar.low <= stop {
                    Some((p.symbol.clone(), stop, bar.timestamp, p.quantity))
                } else {
                    None
                }
            })
            .collect();

        for (symbol, stop_price, timestamp, quantity) in breached {
            let quantity_u64 = quantity.unsigned_abs();
            self.positions.remove(&symbol);
            self.cash += stop_price * Decimal::from(quantity_u64);

            let fill = Fill {
                symbol: symbol.clone(),
                timestamp,
                side: Side::Sell,
                quantity: quantity_u64,
                fill_price: stop_price,
                commission: Decimal::ZERO,
                slippage_applied: Decimal::ZERO,
                reason: FillReason::StopLoss,
            };

            self.trade_journal.push(JournalRow::from_fill(
                self.next_id(),
                &fill,
                Decision::Sell,
                "stop loss breached".to_string(),
            ));
            fills.push(fill);
        }

        fills
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_trade_id;
        self.next_trade_id += 1;
        id
    }

    /// Resolve and execute a batch of signals: sells before buys, emission
    /// order preserved within each side (spec §4.1 step 3). `indicators` and
    /// `thresholds` are the strategy's recorded snapshot for the bar being
    /// filled (spec §4.7); every `JournalRow` produced by this batch carries
    /// a copy of it.
    pub fn execute_batch(
        &mut self,
        signals: Vec<Signal>,
        bar_prices: &HashMap<String, Decimal>,
        config: &ExecutionConfig,
        indicators: &BTreeMap<String, Decimal>,
        thresholds: &BTreeMap<String, Decimal>,
    ) -> Result<Vec<Fill>, TrendLabError> {
        let (sells, buys): (Vec<Signal>, Vec<Signal>) = signals.into_iter().partition(|s| s.side == Side::Sell);

        let mut fills = Vec::new();
        for signal in sells.into_iter().chain(buys.into_iter()) {
            if let Some(fill) = self.execute_one(&signal, bar_prices, config, indicators, thresholds)? {
                fills.push(fill);
            }
        }
        Ok(fills)
    }

    fn execute_one(
        &mut self,
        signal: &Signal,
        bar_prices: &HashMap<String, Decimal>,
        config: &ExecutionConfig,
        indicators: &BTreeMap<String, Decimal>,
        thresholds: &BTreeMap<String, Decimal>,
    ) -> Result<Option<Fill>, TrendLabError> {
        let close = *bar_prices.get(&signal.symbol).ok_or_else(|| TrendLabError::ContractViolation {
            reason: format!("signal references unknown symbol {}", signal.symbol),
            at: Some(signal.timestamp),
        })?;

        let total_equity = self.mark_to_market(bar_prices);
        let current_quantity = self.positions.get(&signal.symbol).map(|p| p.quantity).unwrap_or(0);
        let current_value = Decimal::from(current_quantity) * close;

        let (side, quantity) = match signal.risk_per_share {
            Some(risk_per_share) => {
                let quantity = resolve_risk(total_equity, signal.portfolio_percent, risk_per_share);
                (signal.side, quantity)
            }
            None => match resolve_percent(total_equity, signal.portfolio_percent, current_value, close) {
                Some((side, quantity)) => (side, quantity),
                None => return Ok(None),
            },
        };

        if quantity == 0 {
            return Ok(None);
        }

        let order = Order::new(signal, quantity, close);
        let before_cash = self.cash;
        let before_equity = self.mark_to_market(bar_prices);
        let allocation_before = self.allocation_snapshot(bar_prices);

        let fill = match side {
            Side::Buy => self.fill_buy(&order, config)?,
            Side::Sell => self.fill_sell(&order, config),
        };

        let Some(fill) = fill else {
            return Ok(None);
        };

        self.apply_position_update(&fill, order.risk_per_share);

        let mut bar_prices_after = bar_prices.clone();
        bar_prices_after.insert(signal.symbol.clone(), close);
        let after_equity = self.mark_to_market(&bar_prices_after);
        let allocation_after = self.allocation_snapshot(&bar_prices_after);

        let decision = match side {
            Side::Buy => Decision::Buy,
            Side::Sell => Decision::Sell,
        };

        let id = self.next_id();
        self.trade_journal.push(JournalRow {
            trade_id: id,
            timestamp: fill.timestamp,
            strategy_name: signal.strategy_name.clone(),
            symbol: fill.symbol.clone(),
            decision,
            decision_reason: signal.strategy_name.clone(),
            shares: fill.quantity,
            fill_price: Some(fill.fill_price),
            slippage: fill.slippage_applied,
            commission: fill.commission,
            portfolio_value_before: before_equity,
            portfolio_value_after: after_equity,
            cash_before: before_cash,
            cash_after: self.cash,
            allocation_before,
            allocation_after,
            fill_reason: Some(fill.reason),
            indicators: indicators.clone(),
            thresholds: thresholds.clone(),
        });

        Ok(Some(fill))
    }

    fn fill_buy(&mut self, order: &Order, config: &ExecutionConfig) -> Result<Option<Fill>, TrendLabError> {
        let fill_price = apply_slippage(order.reference_price, Side::Buy, config.slippage_bps);
        let (quantity, fill_price, commission) = self.size_and_shrink_buy(order.quantity, fill_price, config.commission_per_share);

        if quantity == 0 {
            return Ok(None);
        }

        let cost = Decimal::from(quantity) * fill_price + commission;
        self.cash -= cost;

        let reason = if quantity < order.quantity {
            FillReason::CashShrunk
        } else {
            FillReason::Signal
        };

        Ok(Some(Fill {
            symbol: order.symbol.clone(),
            timestamp: order.timestamp,
            side: Side::Buy,
            quantity,
            fill_price,
            commission,
            slippage_applied: fill_price - order.reference_price,
            reason,
        }))
    }

    fn fill_sell(&mut self, order: &Order, config: &ExecutionConfig) -> Option<Fill> {
        let fill_price = apply_slippage(order.reference_price, Side::Sell, config.slippage_bps);
        let commission = config.commission_per_share * Decimal::from(order.quantity);
        let proceeds = Decimal::from(order.quantity) * fill_price - commission;
        self.cash += proceeds;

        Some(Fill {
            symbol: order.symbol.clone(),
            timestamp: order.timestamp,
            side: Side::Sell,
            quantity: order.quantity,
            fill_price,
            commission,
            slippage_applied: order.reference_price - fill_price,
            reason: FillReason::Signal,
        })
    }

    /// Shrink a requested buy quantity until it fits available cash. Returns
    /// `(quantity, fill_price, commission)`; `quantity == 0` means skipped.
    fn size_and_shrink_buy(&self, requested: u64, fill_price: Decimal, commission_per_share: Decimal) -> (u64, Decimal, Decimal) {
        let mut quantity = requested;
        loop {
            if quantity == 0 {
                return (0, fill_price, Decimal::ZERO);
            }
            let commission = commission_per_share * Decimal::from(quantity);
            let cost = Decimal::from(quantity) * fill_price + commission;
            if cost <= self.cash {
                return (quantity, fill_price, commission);
            }
            quantity -= 1;
        }
    }

    fn apply_position_update(&mut self, fill: &Fill, risk_per_share: Option<Decimal>) {
        match fill.side {
            Side::Buy => {
                let entry = self.positions.entry(fill.symbol.clone()).or_insert_with(|| {
                    Position::new(fill.symbol.clone(), 0, fill.fill_price, fill.timestamp)
                });
                let existing_qty = Decimal::from(entry.quantity);
                let new_qty = Decimal::from(fill.quantity);
                let total_qty = existing_qty + new_qty;
                if total_qty > Decimal::ZERO {
                    entry.avg_entry_price = (entry.avg_entry_price * existing_qty + fill.fill_price * new_qty) / total_qty;
                }
                entry.quantity += fill.quantity as i64;
                if let Some(risk) = risk_per_share {
                    entry.stop_price = Some(fill.fill_price - risk);
                }
            }
            Side::Sell => {
                if let Some(position) = self.positions.get_mut(&fill.symbol) {
                    position.quantity -= fill.quantity as i64;
                    if position.quantity <= 0 {
                        self.positions.remove(&fill.symbol);
                    }
                }
            }
        }
    }
}

fn apply_slippage(reference_price: Decimal, side: Side, slippage_bps: i64) -> Decimal {
    let bps = Decimal::new(slippage_bps.max(0), 0) / Decimal::new(10_000, 0);
    reference_price * (Decimal::ONE + bps * Decimal::from(side.sign()))
}
