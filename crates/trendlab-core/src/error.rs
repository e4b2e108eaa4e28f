//! Error types for the backtesting engine.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Core error type for the backtesting engine.
///
/// `CashInsufficient` is deliberately not a variant here: an order that
/// cannot be filled at full size is shrunk or skipped and journaled, never
/// surfaced as an `Err`. See `portfolio::Portfolio::size_and_shrink_buy`.
#[derive(Error, Debug)]
pub enum TrendLabError {
    #[error("invalid bar: {reason}")]
    InvalidBar { reason: String },

    #[error("invalid signal at {at}: {reason}")]
    InvalidSignal { reason: String, at: DateTime<Utc> },

    #[error("insufficient history: need {need} bars, have {have}")]
    InsufficientHistory { need: usize, have: usize },

    #[error("data handler exhausted")]
    DataExhausted,

    #[error("contract violation: {reason}")]
    ContractViolation {
        reason: String,
        at: Option<DateTime<Utc>>,
    },

    #[error("backtest aborted at {at}: {reason}")]
    BacktestAborted { reason: String, at: DateTime<Utc> },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, TrendLabError>;
