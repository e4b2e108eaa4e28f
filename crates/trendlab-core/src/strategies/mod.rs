//! Reference strategy implementations (spec §4.4 "concrete strategies to be
//! supported") — test vectors and usable starting points, not the only
//! strategies the engine can run.

pub mod macd_trend;
pub mod sma_crossover;

pub use macd_trend::MacdTrendStrategy;
pub use sma_crossover::SmaCrossover;
