//! Strategy contract: a polymorphic trait plus a composition-based context
//! bundling bar-history buffers and signal constructors (spec §9 — no
//! abstract base class; default helpers arrive via composition instead).

use crate::bar::Bar;
use crate::error::TrendLabError;
use crate::portfolio::Portfolio;
use crate::signal::Signal;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Default bar-history capacity per symbol (spec §3 "Bar history").
pub const DEFAULT_HISTORY_CAPACITY: usize = 500;

/// Fixed-capacity, O(1)-push ring buffer of recent bars for one symbol.
#[derive(Debug, Clone)]
struct HistoryBuffer {
    capacity: usize,
    bars: VecDeque<Bar>,
}

impl HistoryBuffer {
    fn new(capacity: usize) -> HistoryBuffer {
        HistoryBuffer {
            capacity,
            bars: VecDeque::with_capacity(capacity),
        }
    }

    fn push(&mut self, bar: Bar) {
        if self.bars.len() == self.capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(bar);
    }

    fn tail(&self, n: usize) -> Result<Vec<&Bar>, TrendLabError> {
        if n > self.bars.len() {
            return Err(TrendLabError::InsufficientHistory {
                need: n,
                have: self.bars.len(),
            });
        }
        Ok(self.bars.iter().skip(self.bars.len() - n).collect())
    }
}

/// The helper bundle a strategy uses instead of inherited base-class state:
/// bounded per-symbol bar history, and the only sanctioned way to emit a
/// `Signal` (fractional-share prohibition is centralized in the portfolio,
/// not here; these just build validated `Signal`s).
#[derive(Debug, Clone)]
pub struct StrategyContext {
    histories: HashMap<String, HistoryBuffer>,
    capacity: usize,
    pub indicators: BTreeMap<String, Decimal>,
    pub thresholds: BTreeMap<String, Decimal>,
}

impl StrategyContext {
    pub fn new() -> StrategyContext {
        StrategyContext {
            histories: HashMap::new(),
            capacity: DEFAULT_HISTORY_CAPACITY,
            indicators: BTreeMap::new(),
            thresholds: BTreeMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> StrategyContext {
        StrategyContext {
            histories: HashMap::new(),
            capacity,
            indicators: BTreeMap::new(),
            thresholds: BTreeMap::new(),
        }
    }

    /// Append a newly observed bar to its symbol's history. Called by the
    /// event loop immediately before `Strategy::on_bar`.
    pub fn record_bar(&mut self, bar: Bar) {
        self.histories
            .entry(bar.symbol.clone())
            .or_insert_with(|| HistoryBuffer::new(self.capacity))
            .push(bar);
    }

    pub fn history_len(&self, symbol: &str) -> usize {
        self.histories.get(symbol).map(|h| h.bars.len()).unwrap_or(0)
    }

    pub fn get_closes(&self, symbol: &str, n: usize) -> Result<Vec<Decimal>, TrendLabError> {
        let history = self.histories.get(symbol).ok_or(TrendLabError::InsufficientHistory { need: n, have: 0 })?;
        Ok(history.tail(n)?.into_iter().map(|b| b.close).collect())
    }

    pub fn get_highs(&self, symbol: &str, n: usize) -> Result<Vec<Decimal>, TrendLabError> {
        let history = self.histories.get(symbol).ok_or(TrendLabError::InsufficientHistory { need: n, have: 0 })?;
        Ok(history.tail(n)?.into_iter().map(|b| b.high).collect())
    }

    pub fn get_lows(&self, symbol: &str, n: usize) -> Result<Vec<Decimal>, TrendLabError> {
        let history = self.histories.get(symbol).ok_or(TrendLabError::InsufficientHistory { need: n, have: 0 })?;
        Ok(history.tail(n)?.into_iter().map(|b| b.low).collect())
    }

    pub fn get_bars(&self, symbol: &str, n: usize) -> Result<Vec<Bar>, TrendLabError> {
        let history = self.histories.get(symbol).ok_or(TrendLabError::InsufficientHistory { need: n, have: 0 })?;
        Ok(history.tail(n)?.into_iter().cloned().collect())
    }

    pub fn has_position(&self, symbol: &str, portfolio: &Portfolio) -> bool {
        portfolio.positions.contains_key(symbol)
    }

    pub fn buy(&self, symbol: &str, timestamp: chrono::DateTime<chrono::Utc>, portfolio_percent: Decimal, strategy_name: &str) -> Result<Signal, TrendLabError> {
        Signal::buy(symbol, timestamp, portfolio_percent, None, strategy_name)
    }

    pub fn sell(&self, symbol: &str, timestamp: chrono::DateTime<chrono::Utc>, portfolio_percent: Decimal, strategy_name: &str) -> Result<Signal, TrendLabError> {
        Signal::sell(symbol, timestamp, portfolio_percent, strategy_name)
    }

    pub fn buy_with_risk(
        &self,
        symbol: &str,
        timestamp: chrono::DateTime<chrono::Utc>,
        portfolio_percent: Decimal,
        risk_per_share: Decimal,
        strategy_name: &str,
    ) -> Result<Signal, TrendLabError> {
        Signal::buy(symbol, timestamp, portfolio_percent, Some(risk_per_share), strategy_name)
    }

    /// Report an indicator value for the current bar; surfaces as a dynamic
    /// column in the trade journal CSV.
    pub fn record_indicator(&mut self, name: impl Into<String>, value: Decimal) {
        self.indicators.insert(name.into(), value);
    }

    pub fn record_threshold(&mut self, name: impl Into<String>, value: Decimal) {
        self.thresholds.insert(name.into(), value);
    }
}

impl Default for StrategyContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A trading strategy: consumes one bar at a time and emits zero or more
/// signals. `init` sets parameters once before replay; `on_bar` is called
/// once per bar of each symbol in the strategy's declared universe, in
/// timestamp order (spec §4.4).
pub trait Strategy {
    fn init(&mut self) {}

    fn on_bar(&mut self, ctx: &mut StrategyContext, bar: &Bar) -> Result<Vec<Signal>, TrendLabError>;
}
