//! Signal -> Order quantity resolution.
//!
//! Centralizes the floor-rounding fractional-share prohibition (spec §9):
//! strategies never compute share counts themselves, only a target
//! `portfolio_percent` or `risk_per_share`. `Portfolio::execute_batch` is the
//! only caller of these functions.

use crate::signal::Side;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Percent-of-equity sizing (spec §4.3, "else" branch).
///
/// `target_value = total_equity * portfolio_percent`; the delta against the
/// symbol's current mark-to-market value determines the side and the whole
/// shares to trade. Floors toward zero; leftover value stays in cash.
pub fn resolve_percent(
    total_equity: Decimal,
    portfolio_percent: Decimal,
    current_value: Decimal,
    close: Decimal,
) -> Option<(Side, u64)> {
    if close <= Decimal::ZERO {
        return None;
    }

    let target_value = total_equity * portfolio_percent;
    let delta_value = target_value - current_value;

    let side = if delta_value >= Decimal::ZERO { Side::Buy } else { Side::Sell };
    let quantity = (delta_value.abs() / close).trunc().to_u64().unwrap_or(0);

    if quantity == 0 {
        return None;
    }

    Some((side, quantity))
}

/// ATR-risk sizing (spec §4.3, "if risk_per_share present" branch).
///
/// `risk_budget = total_equity * portfolio_percent`; shares are
/// `floor(risk_budget / risk_per_share)`.
pub fn resolve_risk(total_equity: Decimal, portfolio_percent: Decimal, risk_per_share: Decimal) -> u64 {
    if risk_per_share <= Decimal::ZERO {
        return 0;
    }
    let risk_budget = total_equity * portfolio_percent;
    (risk_budget / risk_per_share).trunc().to_u64().unwrap_or(0)
}
