//! Mutable per-symbol holding owned by [`crate::portfolio::Portfolio`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An open holding in one symbol. Quantity is signed to leave room for true
/// short support (spec open question); the portfolio's default long-only
/// resolution never produces a negative quantity itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: i64,
    pub avg_entry_price: Decimal,
    pub opened_at: DateTime<Utc>,
    pub stop_price: Option<Decimal>,
}

impl Position {
    pub fn new(symbol: impl Into<String>, quantity: i64, entry_price: Decimal, opened_at: DateTime<Utc>) -> Position {
        Position {
            symbol: symbol.into(),
            quantity,
            avg_entry_price: entry_price,
            opened_at,
            stop_price: None,
        }
    }

    pub fn market_value(&self, close: Decimal) -> Decimal {
        Decimal::from(self.quantity) * close
    }
}
