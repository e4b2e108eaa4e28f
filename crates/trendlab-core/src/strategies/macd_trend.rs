//! Five-regime "signal asset" trend strategy (spec §4.4 MACD-trend family).
//!
//! Classifies the market into Bull/Bear/Defense using price-vs-EMA trend,
//! MACD momentum, and an optional external regime symbol (e.g. a volatility
//! index) as a master switch, then rebalances only on regime transitions:
//! exit the previous vehicle, enter the new one. The leveraged bull/bear
//! vehicles use ATR-risk sizing with a trailing stop; the defensive vehicle
//! uses flat-percent sizing with no stop.

use crate::bar::Bar;
use crate::error::TrendLabError;
use crate::indicators::{atr, ema, macd};
use crate::signal::Signal;
use crate::strategy::{Strategy, StrategyContext};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Regime {
    Bull,
    Bear,
    Defense,
}

pub struct MacdTrendStrategy {
    pub signal_symbol: String,
    pub bull_symbol: String,
    pub defense_symbol: String,
    pub bear_symbol: String,
    pub regime_symbol: Option<String>,
    pub regime_threshold: Decimal,

    pub trend_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub atr_period: usize,

    pub risk_percent: Decimal,
    pub atr_stop_multiplier: Decimal,
    pub defense_percent: Decimal,

    last_regime: Option<Regime>,
    last_regime_symbol_close: Option<Decimal>,
}

impl MacdTrendStrategy {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        signal_symbol: impl Into<String>,
        bull_symbol: impl Into<String>,
        defense_symbol: impl Into<String>,
        bear_symbol: impl Into<String>,
        regime_symbol: Option<String>,
    ) -> MacdTrendStrategy {
        MacdTrendStrategy {
            signal_symbol: signal_symbol.into(),
            bull_symbol: bull_symbol.into(),
            defense_symbol: defense_symbol.into(),
            bear_symbol: bear_symbol.into(),
            regime_symbol,
            regime_threshold: Decimal::from(30),
            trend_period: 200,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            atr_period: 14,
            risk_percent: Decimal::new(25, 3),      // 0.025
            atr_stop_multiplier: Decimal::new(30, 1), // 3.0
            defense_percent: Decimal::new(60, 2),   // 0.60
            last_regime: None,
            last_regime_symbol_close: None,
        }
    }

    fn vehicle_for(&self, regime: Regime) -> &str {
        match regime {
            Regime::Bull => &self.bull_symbol,
            Regime::Bear => &self.bear_symbol,
            Regime::Defense => &self.defense_symbol,
        }
    }

    fn classify(&self, price: Decimal, trend_ema: Decimal, macd_line: Decimal, macd_signal: Decimal) -> Regime {
        if let Some(regime_close) = self.last_regime_symbol_close {
            if regime_close > self.regime_threshold {
                return Regime::Defense;
            }
        }

        let trend_up = price > trend_ema;
        let momentum_up = macd_line > macd_signal && macd_line > Decimal::ZERO;

        if trend_up && momentum_up {
            Regime::Bull
        } else if !trend_up && !momentum_up {
            Regime::Bear
        } else {
            Regime::Defense
        }
    }
}

impl Strategy for MacdTrendStrategy {
    fn on_bar(&mut self, ctx: &mut StrategyContext, bar: &Bar) -> Result<Vec<Signal>, TrendLabError> {
        if Some(&bar.symbol) == self.regime_symbol.as_ref() {
            self.last_regime_symbol_close = Some(bar.close);
            return Ok(vec![]);
        }

        if bar.symbol != self.signal_symbol {
            return Ok(vec![]);
        }

        let needed = self.trend_period.max(self.macd_slow + self.macd_signal).max(self.atr_period + 1);
        let closes = match ctx.get_closes(&self.signal_symbol, needed) {
            Ok(closes) => closes,
            Err(_) => return Ok(vec![]),
        };
        let bars = match ctx.get_bars(&self.signal_symbol, needed) {
            Ok(bars) => bars,
            Err(_) => return Ok(vec![]),
        };

        let trend_ema = match ema(&closes, self.trend_period).last().copied().flatten() {
            Some(v) => v,
            None => return Ok(vec![]),
        };
        let macd_result = macd(&closes, self.macd_fast, self.macd_slow, self.macd_signal);
        let (Some(macd_line), Some(macd_signal)) = (
            macd_result.line.last().copied().flatten(),
            macd_result.signal.last().copied().flatten(),
        ) else {
            return Ok(vec![]);
        };
        let atr_now = match atr(&bars, self.atr_period).last().copied().flatten() {
            Some(v) => v,
            None => return Ok(vec![]),
        };

        let price = *closes.last().unwrap();
        let regime = self.classify(price, trend_ema, macd_line, macd_signal);

        ctx.record_indicator("macd_line", macd_line);
        ctx.record_indicator("macd_signal", macd_signal);
        ctx.record_indicator("trend_ema", trend_ema);
        ctx.record_indicator("atr", atr_now);

        if self.last_regime == Some(regime) {
            return Ok(vec![]);
        }

        let mut signals = Vec::new();
        if let Some(previous_regime) = self.last_regime {
            signals.push(ctx.sell(self.vehicle_for(previous_regime), bar.timestamp, Decimal::ZERO, "macd-trend")?);
        }

        match regime {
            Regime::Bull | Regime::Bear => {
                let risk_per_share = self.atr_stop_multiplier * atr_now;
                signals.push(ctx.buy_with_risk(
                    self.vehicle_for(regime),
                    bar.timestamp,
                    self.risk_percent,
                    risk_per_share,
                    "macd-trend",
                )?);
            }
            Regime::Defense => {
                signals.push(ctx.buy(self.vehicle_for(regime), bar.timestamp, self.defense_percent, "macd-trend")?);
            }
        }

        self.last_regime = Some(regime);
        Ok(signals)
    }
}
