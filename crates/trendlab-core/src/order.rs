//! Portfolio-internal order: a [`crate::signal::Signal`] resolved to a share count.

use crate::signal::{Side, Signal};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// A `Signal` resolved by the portfolio into a whole-share order. Never
/// constructed by strategies; built internally by `Portfolio::execute_batch`.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub side: Side,
    pub quantity: u64,
    pub reference_price: Decimal,
    pub risk_per_share: Option<Decimal>,
    pub strategy_name: String,
}

impl Order {
    pub fn new(signal: &Signal, quantity: u64, reference_price: Decimal) -> Order {
        Order {
            symbol: signal.symbol.clone(),
            timestamp: signal.timestamp,
            side: signal.side,
            quantity,
            reference_price,
            risk_per_share: signal.risk_per_share,
            strategy_name: signal.strategy_name.clone(),
        }
    }
}
