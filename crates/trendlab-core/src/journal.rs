//! Per-fill trade journal and CSV export.

use crate::fill::{Fill, FillReason};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::io::Write;

/// What the portfolio decided for a symbol at a given timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Buy,
    Sell,
    Hold,
}

impl Decision {
    fn as_str(self) -> &'static str {
        match self {
            Decision::Buy => "BUY",
            Decision::Sell => "SELL",
            Decision::Hold => "HOLD",
        }
    }
}

/// One journaled row: a fill (or, in Hold mode, a decision with no fill).
///
/// `indicators`/`thresholds` are the dynamic columns a strategy reports via
/// `StrategyContext::record_indicator`/`record_threshold`; the CSV writer
/// unions these keys across all rows, leaving blanks where a row didn't
/// report a given key.
#[derive(Debug, Clone)]
pub struct JournalRow {
    pub trade_id: u64,
    pub timestamp: DateTime<Utc>,
    pub strategy_name: String,
    pub symbol: String,
    pub decision: Decision,
    pub decision_reason: String,
    pub shares: u64,
    pub fill_price: Option<Decimal>,
    pub slippage: Decimal,
    pub commission: Decimal,
    pub portfolio_value_before: Decimal,
    pub portfolio_value_after: Decimal,
    pub cash_before: Decimal,
    pub cash_after: Decimal,
    pub allocation_before: BTreeMap<String, Decimal>,
    pub allocation_after: BTreeMap<String, Decimal>,
    pub fill_reason: Option<FillReason>,
    pub indicators: BTreeMap<String, Decimal>,
    pub thresholds: BTreeMap<String, Decimal>,
}

impl JournalRow {
    pub fn from_fill(trade_id: u64, fill: &Fill, decision: Decision, reason: String) -> JournalRow {
        JournalRow {
            trade_id,
            timestamp: fill.timestamp,
            strategy_name: String::new(),
            symbol: fill.symbol.clone(),
            decision,
            decision_reason: reason,
            shares: fill.quantity,
            fill_price: Some(fill.fill_price),
            slippage: fill.slippage_applied,
            commission: fill.commission,
            portfolio_value_before: Decimal::ZERO,
            portfolio_value_after: Decimal::ZERO,
            cash_before: Decimal::ZERO,
            cash_after: Decimal::ZERO,
            allocation_before: BTreeMap::new(),
            allocation_after: BTreeMap::new(),
            fill_reason: Some(fill.reason),
            indicators: BTreeMap::new(),
            thresholds: BTreeMap::new(),
        }
    }

    fn position_value(&self) -> Decimal {
        match self.fill_price {
            Some(price) => price * Decimal::from(self.shares),
            None => Decimal::ZERO,
        }
    }

    fn cumulative_return_pct(&self, initial_capital: Decimal) -> Decimal {
        if initial_capital == Decimal::ZERO {
            return Decimal::ZERO;
        }
        (self.portfolio_value_after - initial_capital) / initial_capital * Decimal::from(100)
    }

    fn allocation_string(allocation: &BTreeMap<String, Decimal>) -> String {
        allocation
            .iter()
            .map(|(symbol, fraction)| format!("{symbol}: {:.1}%", fraction * Decimal::from(100)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn format_decimal_opt(value: Option<Decimal>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write the trade journal to CSV per spec §4.7: fixed columns, then the
/// union of dynamic indicator/threshold keys across all rows (blank where a
/// row didn't report that key), then the buy-and-hold comparison column.
pub fn write_csv(
    rows: &[JournalRow],
    signal_closes: &[(DateTime<Utc>, Decimal)],
    signal_symbol: &str,
    initial_capital: Decimal,
    w: impl Write,
) -> Result<(), crate::error::TrendLabError> {
    let mut indicator_keys: Vec<String> = rows
        .iter()
        .flat_map(|r| r.indicators.keys().cloned())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    indicator_keys.sort();

    let mut threshold_keys: Vec<String> = rows
        .iter()
        .flat_map(|r| r.thresholds.keys().cloned())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    threshold_keys.sort();

    let buy_hold_column = format!("BuyHold_{signal_symbol}_Value");
    let entry_close = signal_closes.first().map(|(_, c)| *c);

    let mut header = vec![
        "trade_id".to_string(),
        "timestamp".to_string(),
        "strategy_state".to_string(),
        "symbol".to_string(),
        "decision".to_string(),
        "decision_reason".to_string(),
        "order_type".to_string(),
        "shares".to_string(),
        "fill_price".to_string(),
        "position_value".to_string(),
        "slippage".to_string(),
        "commission".to_string(),
        "portfolio_value_before".to_string(),
        "portfolio_value_after".to_string(),
        "cash_before".to_string(),
        "cash_after".to_string(),
        "allocation_before".to_string(),
        "allocation_after".to_string(),
        "cumulative_return_pct".to_string(),
    ];
    header.extend(indicator_keys.iter().cloned());
    header.extend(threshold_keys.iter().cloned());
    header.push(buy_hold_column);

    let mut writer = csv::WriterBuilder::new().from_writer(w);
    writer.write_record(&header)?;

    for row in rows {
        let buy_hold_value = match (entry_close, initial_capital) {
            (Some(entry), capital) if entry > Decimal::ZERO => {
                let current = signal_closes
                    .iter()
                    .rev()
                    .find(|(ts, _)| *ts <= row.timestamp)
                    .map(|(_, c)| *c)
                    .unwrap_or(entry);
                (capital / entry * current).to_string()
            }
            _ => String::new(),
        };

        let order_type = match row.fill_reason {
            Some(FillReason::StopLoss) => "Stop",
            Some(FillReason::CashShrunk) => "Market (shrunk)",
            Some(FillReason::Signal) | None => "Market",
        };

        let mut record = vec![
            row.trade_id.to_string(),
            row.timestamp.to_rfc3339(),
            row.strategy_name.clone(),
            row.symbol.clone(),
            row.decision.as_str().to_string(),
            row.decision_reason.clone(),
            order_type.to_string(),
            row.shares.to_string(),
            format_decimal_opt(row.fill_price),
            row.position_value().to_string(),
            row.slippage.to_string(),
            row.commission.to_string(),
            row.portfolio_value_before.to_string(),
            row.portfolio_value_after.to_string(),
            row.cash_before.to_string(),
            row.cash_after.to_string(),
            JournalRow::allocation_string(&row.allocation_before),
            JournalRow::allocation_string(&row.allocation_after),
            row.cumulative_return_pct(initial_capital).to_string(),
        ];

        for key in &indicator_keys {
            record.push(row.indicators.get(key).map(|v| v.to_string()).unwrap_or_default());
        }
        for key in &threshold_keys {
            record.push(row.thresholds.get(key).map(|v| v.to_string()).unwrap_or_default());
        }
        record.push(buy_hold_value);

        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}
