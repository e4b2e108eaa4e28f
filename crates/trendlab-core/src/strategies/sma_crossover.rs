//! Single-symbol SMA crossover: enter when the short SMA crosses above the
//! long SMA, exit on the reverse cross.

use crate::bar::Bar;
use crate::error::TrendLabError;
use crate::indicators::sma;
use crate::signal::Signal;
use crate::strategy::{Strategy, StrategyContext};
use rust_decimal::Decimal;

pub struct SmaCrossover {
    pub symbol: String,
    pub short: usize,
    pub long: usize,
    pub portfolio_percent: Decimal,
    was_above: Option<bool>,
}

impl SmaCrossover {
    pub fn new(symbol: impl Into<String>, short: usize, long: usize, portfolio_percent: Decimal) -> SmaCrossover {
        SmaCrossover {
            symbol: symbol.into(),
            short,
            long,
            portfolio_percent,
            was_above: None,
        }
    }
}

impl Strategy for SmaCrossover {
    fn on_bar(&mut self, ctx: &mut StrategyContext, bar: &Bar) -> Result<Vec<Signal>, TrendLabError> {
        if bar.symbol != self.symbol {
            return Ok(vec![]);
        }

        let closes = match ctx.get_closes(&self.symbol, self.long) {
            Ok(closes) => closes,
            Err(_) => return Ok(vec![]),
        };

        let short_now = sma(&closes, self.short).last().copied().flatten();
        let long_now = sma(&closes, self.long).last().copied().flatten();

        let (Some(short_now), Some(long_now)) = (short_now, long_now) else {
            return Ok(vec![]);
        };

        ctx.record_indicator(format!("sma{}", self.short), short_now);
        ctx.record_indicator(format!("sma{}", self.long), long_now);

        let is_above = short_now > long_now;
        let mut signals = Vec::new();

        if let Some(was_above) = self.was_above {
            if !was_above && is_above {
                signals.push(ctx.buy(&self.symbol, bar.timestamp, self.portfolio_percent, "sma-crossover")?);
            } else if was_above && !is_above {
                signals.push(ctx.sell(&self.symbol, bar.timestamp, Decimal::ZERO, "sma-crossover")?);
            }
        }

        self.was_above = Some(is_above);
        Ok(signals)
    }
}
