//! Executed outcome of an order.

use crate::signal::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Why a fill was generated, for journal tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillReason {
    /// Ordinary execution of a strategy signal.
    Signal,
    /// Synthesized exit because a position's stop price was breached.
    StopLoss,
    /// Buy shrunk to the largest affordable whole-share quantity.
    CashShrunk,
}

/// The executed outcome of an [`crate::order::Order`]. May be smaller than
/// requested if cash-shrunk (§4.3). Invariants: `quantity > 0`,
/// `fill_price > 0`, `commission >= 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub side: Side,
    pub quantity: u64,
    pub fill_price: Decimal,
    pub commission: Decimal,
    pub slippage_applied: Decimal,
    pub reason: FillReason,
}
