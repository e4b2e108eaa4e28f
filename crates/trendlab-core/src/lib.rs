//! TrendLab Core — event-driven backtesting engine for equities/ETF
//! strategies.
//!
//! Bar-by-bar replay (`engine::run`) drives a user-supplied [`strategy::Strategy`]
//! against a [`data_handler::DataHandler`], simulating a [`portfolio::Portfolio`]
//! with decimal-exact cash/position accounting and integer-share orders, and
//! produces a [`engine::BacktestResult`] that [`metrics::compute_metrics`] and
//! [`journal::write_csv`] consume.

pub mod bar;
pub mod data_handler;
pub mod engine;
pub mod error;
pub mod fill;
pub mod indicators;
pub mod journal;
pub mod metrics;
pub mod order;
pub mod portfolio;
pub mod position;
pub mod signal;
pub mod sizing;
pub mod strategies;
pub mod strategy;

pub use bar::Bar;
pub use data_handler::{CompletenessPolicy, DataHandler, InMemoryDataHandler, Universe};
pub use engine::{run, BacktestResult, RunMetadata};
pub use error::{Result, TrendLabError};
pub use fill::{Fill, FillReason};
pub use journal::{Decision, JournalRow};
pub use metrics::{compute_metrics, Metrics};
pub use order::Order;
pub use portfolio::{EquityPoint, ExecutionConfig, FillPolicy, Portfolio};
pub use position::Position;
pub use signal::{Side, Signal};
pub use strategy::{Strategy, StrategyContext};

/// Commonly used types, re-exported for `use trendlab_core::prelude::*;`.
pub mod prelude {
    pub use crate::bar::Bar;
    pub use crate::data_handler::{CompletenessPolicy, DataHandler, InMemoryDataHandler, Universe};
    pub use crate::engine::{run, BacktestResult, RunMetadata};
    pub use crate::error::{Result, TrendLabError};
    pub use crate::metrics::{compute_metrics, Metrics};
    pub use crate::portfolio::{ExecutionConfig, FillPolicy, Portfolio};
    pub use crate::signal::Signal;
    pub use crate::strategy::{Strategy, StrategyContext};
}
