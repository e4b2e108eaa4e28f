//! The event loop: drives replay bar-by-bar (spec §4.1).
//!
//! Single-threaded and synchronous. Per `T`-group: append each bar to the
//! strategy's history and call `on_bar` in symbol order, collect the
//! emitted signals, apply stop-losses, execute the batch (sells before
//! buys), record equity and the allocation snapshot, advance.

use crate::bar::Bar;
use crate::data_handler::DataHandler;
use crate::error::{Result, TrendLabError};
use crate::portfolio::{ExecutionConfig, Portfolio};
use crate::signal::Signal;
use crate::strategy::{Strategy, StrategyContext};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

/// Metadata describing how a run was configured, carried in the result for
/// reporting (spec §6 "Outbound (results)").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub strategy_name: String,
    pub parameters: serde_json::Value,
    pub initial_capital: Decimal,
    pub logical_start: Option<DateTime<Utc>>,
    pub start_timestamp: Option<DateTime<Utc>>,
    pub end_timestamp: Option<DateTime<Utc>>,
    /// `true` if the run ended early via the cooperative cancellation flag
    /// rather than data exhaustion.
    pub cancelled: bool,
}

/// The terminal output of a replay: journal, equity curve, final value, and
/// the metadata needed to interpret them (spec §4.1 "Termination").
#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub journal: Vec<crate::journal::JournalRow>,
    pub equity_history: Vec<crate::portfolio::EquityPoint>,
    pub final_value: Decimal,
    pub metadata: RunMetadata,
}

/// Drive a single-threaded replay of `data_handler` through `strategy`,
/// mutating `portfolio` as the only side effect (spec §4.1).
///
/// `logical_start`, if given, marks where warm-up bars end; it is carried
/// into `RunMetadata` untouched so the metrics layer can exclude warm-up
/// from its statistics (spec §9 resolved open question).
pub fn run(
    data_handler: &mut dyn DataHandler,
    strategy: &mut dyn Strategy,
    ctx: &mut StrategyContext,
    portfolio: &mut Portfolio,
    config: &ExecutionConfig,
    strategy_name: impl Into<String>,
    parameters: serde_json::Value,
    logical_start: Option<DateTime<Utc>>,
    stop_requested: Option<&AtomicBool>,
) -> Result<BacktestResult> {
    strategy.init();

    let strategy_name = strategy_name.into();
    let mut start_timestamp = None;
    let mut end_timestamp = None;
    let mut cancelled = false;

    // Signals awaiting execution at the *next* group's open prices, used
    // only under `FillPolicy::NextBarOpen` (spec §4.3, §9 open question).
    // Carries the indicator/threshold snapshot recorded when the signals
    // were emitted, so it still reaches the journal row once filled.
    let mut pending: Option<(Vec<Signal>, BTreeMap<String, Decimal>, BTreeMap<String, Decimal>)> = None;

    loop {
        if let Some(flag) = stop_requested {
            if flag.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }
        }

        let Some(group) = data_handler.next_group() else {
            break;
        };
        let (timestamp, bars) = group?;

        if start_timestamp.is_none() {
            start_timestamp = Some(timestamp);
        }
        end_timestamp = Some(timestamp);

        let opens: HashMap<String, Decimal> = bars.iter().map(|b| (b.symbol.clone(), b.open)).collect();
        let closes: HashMap<String, Decimal> = bars.iter().map(|b| (b.symbol.clone(), b.close)).collect();
        let stop_check: HashMap<String, &Bar> = bars.iter().map(|b| (b.symbol.clone(), b)).collect();

        // Stop-loss checks happen before this bar's signals are processed
        // (spec §4.3 "Stop-loss handling").
        portfolio.apply_stop_losses(&stop_check);

        // Execute any batch deferred from the prior bar at this bar's open,
        // using the indicator/threshold snapshot recorded when it was
        // emitted (spec §4.7).
        if let Some((deferred, indicators, thresholds)) = pending.take() {
            portfolio.execute_batch(deferred, &opens, config, &indicators, &thresholds)?;
        }

        let mut signals: Vec<Signal> = Vec::new();
        for bar in &bars {
            ctx.record_bar(bar.clone());
            let emitted = strategy.on_bar(ctx, bar)?;
            for signal in &emitted {
                if signal.portfolio_percent < Decimal::ZERO || signal.portfolio_percent > Decimal::ONE {
                    return Err(TrendLabError::BacktestAborted {
                        reason: format!(
                            "strategy emitted portfolio_percent {} outside [0,1] for {}",
                            signal.portfolio_percent, signal.symbol
                        ),
                        at: timestamp,
                    });
                }
            }
            signals.extend(emitted);
        }

        // Snapshot this bar's reported indicators/thresholds and reset the
        // context so the next group starts from a clean slate.
        let indicators = std::mem::take(&mut ctx.indicators);
        let thresholds = std::mem::take(&mut ctx.thresholds);

        match config.fill_policy {
            crate::portfolio::FillPolicy::CloseOfBar => {
                portfolio.execute_batch(signals, &closes, config, &indicators, &thresholds)?;
            }
            crate::portfolio::FillPolicy::NextBarOpen => {
                pending = Some((signals, indicators, thresholds));
            }
        }

        portfolio.record_equity(timestamp, &closes);
    }

    let final_value = portfolio
        .equity_history
        .last()
        .map(|p| p.equity)
        .unwrap_or(portfolio.cash);

    Ok(BacktestResult {
        journal: portfolio.trade_journal.clone(),
        equity_history: portfolio.equity_history.clone(),
        final_value,
        metadata: RunMetadata {
            strategy_name,
            parameters,
            initial_capital: portfolio.equity_history.first().map(|p| p.equity).unwrap_or(portfolio.cash),
            logical_start,
            start_timestamp,
            end_timestamp,
            cancelled,
        },
    })
}
