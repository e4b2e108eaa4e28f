//! TrendLab CLI — thin external caller that wires CSV bar loading, a named
//! strategy, and the backtest engine together (spec.md §6, §1 "out of
//! scope": CLI parsing/config loading live here, not in the engine core).

use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;
use rust_decimal::Decimal;
use std::path::PathBuf;

use trendlab_cli::commands::run::{execute_run, parse_fill_policy, parse_timeframe, BacktestArgs};
use trendlab_cli::commands::terminal::format_metrics_colored;

/// Run a single backtest over CSV bar data.
#[derive(Parser)]
#[command(name = "trendlab")]
#[command(author, version, about = "Event-driven backtesting engine for equities/ETF strategies", long_about = None)]
struct Cli {
    /// Strategy to run: sma-crossover or macd-trend.
    #[arg(long)]
    strategy: String,

    /// Opaque strategy parameters as a JSON object, e.g. '{"short":10,"long":30}'.
    #[arg(long, default_value = "{}")]
    strategy_params: String,

    /// Symbols to trade, comma-separated; the first is the signal symbol.
    #[arg(long, value_delimiter = ',')]
    symbols: Vec<String>,

    /// CSV file(s) of bars; each row has symbol,timestamp,open,high,low,close,volume.
    #[arg(long = "data", required = true)]
    data: Vec<PathBuf>,

    /// Bar timeframe: 1D, 1W, 1M, or 1H.
    #[arg(long, default_value = "1D")]
    timeframe: String,

    /// Logical start date (inclusive, UTC), YYYY-MM-DD.
    #[arg(long)]
    start_date: NaiveDate,

    /// Logical end date (inclusive, UTC), YYYY-MM-DD.
    #[arg(long)]
    end_date: NaiveDate,

    /// Initial cash.
    #[arg(long, default_value = "100000")]
    initial_capital: Decimal,

    /// Commission charged per share.
    #[arg(long, default_value = "0.01")]
    commission_per_share: Decimal,

    /// Slippage in basis points applied against the reference price.
    #[arg(long, default_value_t = 0)]
    slippage_bps: i64,

    /// Fill policy: close_of_bar or next_bar_open.
    #[arg(long, default_value = "close_of_bar")]
    fill_policy: String,

    /// Bars to prime indicator history before start_date. Defaults to the
    /// strategy's longest lookback if omitted.
    #[arg(long)]
    warmup_bars: Option<usize>,

    /// Where to write the per-fill trade journal CSV.
    #[arg(long)]
    journal_output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = trendlab_logging::LogConfig::from_env();
    let _guard = trendlab_logging::init_cli_logging(&log_config);

    let strategy_params: serde_json::Value = serde_json::from_str(&cli.strategy_params)?;

    let args = BacktestArgs {
        strategy: cli.strategy,
        strategy_params,
        symbols: cli.symbols,
        data: cli.data,
        timeframe: parse_timeframe(&cli.timeframe)?,
        start_date: cli.start_date,
        end_date: cli.end_date,
        initial_capital: cli.initial_capital,
        commission_per_share: cli.commission_per_share,
        slippage_bps: cli.slippage_bps,
        fill_policy: parse_fill_policy(&cli.fill_policy)?,
        warmup_bars: cli.warmup_bars,
        journal_output: cli.journal_output,
    };

    let (result, metrics) = execute_run(&args)?;

    println!("final value: {}", result.final_value);
    println!("fills: {}", result.journal.len());
    print!("{}", format_metrics_colored(&metrics));

    Ok(())
}
