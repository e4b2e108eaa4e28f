//! Library half of the `trendlab-cli` binary: kept separate from `main.rs`
//! so the run-wiring logic is unit- and integration-testable without
//! spawning a subprocess (teacher convention).

pub mod commands;
