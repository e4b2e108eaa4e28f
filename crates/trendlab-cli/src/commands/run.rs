//! Run command: load CSV bars, resolve a strategy by name, execute the
//! engine, write the trade journal, print the metrics summary.
//!
//! This crate is the thin external collaborator spec.md §1/§6 describes:
//! CLI parsing and CSV loading are out of scope for the engine core, but a
//! working caller still has to exist to exercise it end to end.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use std::path::PathBuf;

use trendlab_core::data_handler::{CompletenessPolicy, InMemoryDataHandler, Universe};
use trendlab_core::metrics::Timeframe;
use trendlab_core::portfolio::{ExecutionConfig, FillPolicy};
use trendlab_core::strategies::{MacdTrendStrategy, SmaCrossover};
use trendlab_core::{compute_metrics, journal, run as run_engine, Bar, Portfolio, Strategy, StrategyContext};

/// Raw CSV row, one per bar. A single file may hold one or many symbols.
#[derive(Debug, serde::Deserialize)]
struct BarRow {
    symbol: String,
    timestamp: DateTime<Utc>,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: u64,
}

/// Resolved options for one run, built from CLI arguments (spec.md §6
/// "recognized options").
pub struct BacktestArgs {
    pub strategy: String,
    pub strategy_params: serde_json::Value,
    pub symbols: Vec<String>,
    pub data: Vec<PathBuf>,
    pub timeframe: Timeframe,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: Decimal,
    pub commission_per_share: Decimal,
    pub slippage_bps: i64,
    pub fill_policy: FillPolicy,
    pub warmup_bars: Option<usize>,
    pub journal_output: Option<PathBuf>,
}

pub fn parse_timeframe(s: &str) -> Result<Timeframe> {
    match s.to_uppercase().as_str() {
        "1D" | "D" | "DAILY" => Ok(Timeframe::Daily),
        "1W" | "W" | "WEEKLY" => Ok(Timeframe::Weekly),
        "1M" | "MONTHLY" => Ok(Timeframe::Monthly),
        "1H" | "H" | "HOURLY" => Ok(Timeframe::Hourly),
        other => bail!("unrecognized timeframe '{other}'; expected 1D, 1W, 1M, or 1H"),
    }
}

pub fn parse_fill_policy(s: &str) -> Result<FillPolicy> {
    match s {
        "close_of_bar" => Ok(FillPolicy::CloseOfBar),
        "next_bar_open" => Ok(FillPolicy::NextBarOpen),
        other => bail!("unrecognized fill policy '{other}'; expected close_of_bar or next_bar_open"),
    }
}

fn load_bars(paths: &[PathBuf]) -> Result<Vec<Bar>> {
    let mut bars = Vec::new();
    for path in paths {
        let mut reader = csv::Reader::from_path(path).with_context(|| format!("open bars csv: {}", path.display()))?;
        for record in reader.deserialize() {
            let row: BarRow = record.with_context(|| format!("parse bar row in {}", path.display()))?;
            let bar = Bar::new(row.symbol, row.timestamp, row.open, row.high, row.low, row.close, row.volume)?;
            bars.push(bar);
        }
    }
    Ok(bars)
}

/// Build the strategy named on the command line from the signal symbol and
/// opaque JSON parameters (spec.md §6: "strategy-specific parameters
/// (opaque to the engine), passed through to `init`").
fn resolve_strategy(name: &str, symbols: &[String], params: &serde_json::Value) -> Result<Box<dyn Strategy>> {
    let signal_symbol = symbols.first().context("at least one symbol is required")?.clone();

    match name {
        "sma-crossover" => {
            let short = params.get("short").and_then(|v| v.as_u64()).unwrap_or(20) as usize;
            let long = params.get("long").and_then(|v| v.as_u64()).unwrap_or(50) as usize;
            let percent = params
                .get("portfolio_percent")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<Decimal>().ok())
                .unwrap_or(Decimal::ONE);
            Ok(Box::new(SmaCrossover::new(signal_symbol, short, long, percent)))
        }
        "macd-trend" => {
            let bull = params.get("bull").and_then(|v| v.as_str()).unwrap_or("TQQQ").to_string();
            let defense = params.get("defense").and_then(|v| v.as_str()).unwrap_or("SHY").to_string();
            let bear = params.get("bear").and_then(|v| v.as_str()).unwrap_or("SQQQ").to_string();
            let regime = params.get("regime").and_then(|v| v.as_str()).map(str::to_string);
            Ok(Box::new(MacdTrendStrategy::new(signal_symbol, bull, defense, bear, regime)))
        }
        other => bail!("unknown strategy '{other}'; available: sma-crossover, macd-trend"),
    }
}

fn default_warmup(strategy: &str, params: &serde_json::Value) -> usize {
    match strategy {
        "sma-crossover" => params.get("long").and_then(|v| v.as_u64()).unwrap_or(50) as usize,
        "macd-trend" => 200,
        _ => 0,
    }
}

/// Drive one full backtest: load bars, build the strategy/portfolio, run the
/// engine, write the journal CSV (if requested), return the computed
/// metrics for terminal display.
pub fn execute_run(args: &BacktestArgs) -> Result<(trendlab_core::BacktestResult, trendlab_core::Metrics)> {
    let all_bars = load_bars(&args.data)?;
    if all_bars.is_empty() {
        bail!("no bars loaded from the given --data path(s)");
    }

    let start_ts = Utc.from_utc_datetime(&args.start_date.and_hms_opt(0, 0, 0).unwrap());
    let end_ts = Utc.from_utc_datetime(&args.end_date.and_hms_opt(23, 59, 59).unwrap());

    let universe = Universe::new(args.symbols.clone());
    let signal_symbol = args.symbols.first().context("at least one symbol is required")?.clone();
    let policy = if args.symbols.len() > 1 {
        CompletenessPolicy::Strict
    } else {
        CompletenessPolicy::Lenient { signal_symbol: signal_symbol.clone() }
    };

    let warmup_bars = args.warmup_bars.unwrap_or_else(|| default_warmup(&args.strategy, &args.strategy_params));

    let mut signal_closes: Vec<(DateTime<Utc>, Decimal)> = all_bars
        .iter()
        .filter(|b| b.symbol == signal_symbol && b.timestamp >= start_ts && b.timestamp <= end_ts)
        .map(|b| (b.timestamp, b.close))
        .collect();
    signal_closes.sort_by_key(|(ts, _)| *ts);

    let mut handler = InMemoryDataHandler::new(all_bars, &universe, policy, Some(start_ts), warmup_bars);

    let mut strategy = resolve_strategy(&args.strategy, &args.symbols, &args.strategy_params)?;
    let mut ctx = StrategyContext::new();
    let mut portfolio = Portfolio::new(args.initial_capital);
    let config = ExecutionConfig {
        fill_policy: args.fill_policy,
        commission_per_share: args.commission_per_share,
        slippage_bps: args.slippage_bps,
    };

    let result = run_engine(
        &mut handler,
        strategy.as_mut(),
        &mut ctx,
        &mut portfolio,
        &config,
        args.strategy.clone(),
        args.strategy_params.clone(),
        Some(start_ts),
        None,
    )?;

    if let Some(output) = &args.journal_output {
        let file = std::fs::File::create(output).with_context(|| format!("create journal output {}", output.display()))?;
        journal::write_csv(&result.journal, &signal_closes, &signal_symbol, args.initial_capital, file)?;
    }

    let metrics = compute_metrics(&result, args.initial_capital, args.timeframe, 0.02);
    Ok((result, metrics))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_timeframe_accepts_known_aliases() {
        assert!(matches!(parse_timeframe("1D").unwrap(), Timeframe::Daily));
        assert!(matches!(parse_timeframe("weekly").unwrap(), Timeframe::Weekly));
        assert!(parse_timeframe("bogus").is_err());
    }

    #[test]
    fn parse_fill_policy_accepts_known_values() {
        assert!(matches!(parse_fill_policy("close_of_bar").unwrap(), FillPolicy::CloseOfBar));
        assert!(matches!(parse_fill_policy("next_bar_open").unwrap(), FillPolicy::NextBarOpen));
        assert!(parse_fill_policy("whenever").is_err());
    }

    #[test]
    fn resolve_strategy_rejects_unknown_name() {
        let symbols = vec!["X".to_string()];
        let err = resolve_strategy("not-a-strategy", &symbols, &serde_json::Value::Null).unwrap_err();
        assert!(err.to_string().contains("unknown strategy"));
    }

    #[test]
    fn resolve_strategy_builds_sma_crossover_with_defaults() {
        let symbols = vec!["X".to_string()];
        let strategy = resolve_strategy("sma-crossover", &symbols, &serde_json::Value::Null);
        assert!(strategy.is_ok());
    }

    #[test]
    fn default_warmup_uses_long_period_for_sma_crossover() {
        let params = serde_json::json!({"long": 75});
        assert_eq!(default_warmup("sma-crossover", &params), 75);
    }
}
