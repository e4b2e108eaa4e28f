//! Strategy-emitted intent to hold a target allocation of one symbol.

use crate::error::TrendLabError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for buy, -1 for sell; used for slippage direction and stop math.
    pub fn sign(self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

/// A strategy's expressed intent to hold a target allocation of one symbol.
///
/// Resolved by the portfolio into an integer-share [`crate::order::Order`].
/// Never constructed directly outside the crate: use [`Signal::buy`] /
/// [`Signal::sell`], which validate `portfolio_percent` and the optional
/// risk/limit fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub side: Side,
    pub portfolio_percent: Decimal,
    pub risk_per_share: Option<Decimal>,
    pub limit_price: Option<Decimal>,
    pub strategy_name: String,
}

impl Signal {
    #[allow(clippy::too_many_arguments)]
    fn build(
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        side: Side,
        portfolio_percent: Decimal,
        risk_per_share: Option<Decimal>,
        limit_price: Option<Decimal>,
        strategy_name: impl Into<String>,
    ) -> Result<Signal, TrendLabError> {
        if portfolio_percent < Decimal::ZERO || portfolio_percent > Decimal::ONE {
            return Err(TrendLabError::InvalidSignal {
                reason: format!("portfolio_percent {portfolio_percent} outside [0,1]"),
                at: timestamp,
            });
        }
        if let Some(r) = risk_per_share {
            if r <= Decimal::ZERO {
                return Err(TrendLabError::InvalidSignal {
                    reason: format!("risk_per_share {r} must be > 0"),
                    at: timestamp,
                });
            }
        }
        if let Some(l) = limit_price {
            if l <= Decimal::ZERO {
                return Err(TrendLabError::InvalidSignal {
                    reason: format!("limit_price {l} must be > 0"),
                    at: timestamp,
                });
            }
        }
        Ok(Signal {
            symbol: symbol.into(),
            timestamp,
            side,
            portfolio_percent,
            risk_per_share,
            limit_price,
            strategy_name: strategy_name.into(),
        })
    }

    /// Target a `portfolio_percent` allocation via a buy. `0.0` is meaningless
    /// for a buy (use [`Signal::sell`] with `0.0` to fully exit).
    pub fn buy(
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        portfolio_percent: Decimal,
        risk_per_share: Option<Decimal>,
        strategy_name: impl Into<String>,
    ) -> Result<Signal, TrendLabError> {
        Self::build(
            symbol,
            timestamp,
            Side::Buy,
            portfolio_percent,
            risk_per_share,
            None,
            strategy_name,
        )
    }

    /// Target a `portfolio_percent` allocation via a sell. `0.0` means fully
    /// exit the position.
    pub fn sell(
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        portfolio_percent: Decimal,
        strategy_name: impl Into<String>,
    ) -> Result<Signal, TrendLabError> {
        Self::build(
            symbol,
            timestamp,
            Side::Sell,
            portfolio_percent,
            None,
            None,
            strategy_name,
        )
    }
}
