//! Ordered bar iterator over one or many symbols (spec §4.2).

use crate::bar::Bar;
use crate::error::TrendLabError;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Required symbols for a backtest run.
#[derive(Debug, Clone)]
pub struct Universe {
    pub symbols: BTreeSet<String>,
}

impl Universe {
    pub fn new(symbols: impl IntoIterator<Item = impl Into<String>>) -> Universe {
        Universe {
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }
}

/// Whether every required symbol must have a bar at a timestamp for that
/// timestamp to be emitted (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletenessPolicy {
    /// Require all symbols in the universe.
    Strict,
    /// Require only the signal symbol; other symbols are simply absent from
    /// the group on timestamps they have no bar (no synthetic fill).
    Lenient { signal_symbol: String },
}

/// An ordered, finite source of `(timestamp, bars)` groups, strictly
/// timestamp-increasing, at most one bar per symbol per group, bars within a
/// group sorted lexicographically by symbol.
pub trait DataHandler {
    fn next_group(&mut self) -> Option<Result<(DateTime<Utc>, Vec<Bar>), TrendLabError>>;
}

/// In-memory reference `DataHandler` built from one or more `Vec<Bar>`
/// inputs, grouped by timestamp.
pub struct InMemoryDataHandler {
    groups: std::collections::btree_map::IntoIter<DateTime<Utc>, Vec<Bar>>,
    pub logical_start: Option<DateTime<Utc>>,
}

impl InMemoryDataHandler {
    /// Build a handler from bars across one or more symbols, applying the
    /// completeness policy and warm-up shift.
    ///
    /// `logical_start` is the date the caller actually wants results for;
    /// `warmup_bars` shifts the emission start back by that many grouped
    /// timestamps so strategies can prime their indicator history before it.
    pub fn new(
        bars: Vec<Bar>,
        universe: &Universe,
        policy: CompletenessPolicy,
        logical_start: Option<DateTime<Utc>>,
        warmup_bars: usize,
    ) -> InMemoryDataHandler {
        let mut by_timestamp: BTreeMap<DateTime<Utc>, BTreeMap<String, Bar>> = BTreeMap::new();
        for bar in bars {
            by_timestamp.entry(bar.timestamp).or_default().insert(bar.symbol.clone(), bar);
        }

        let mut groups: BTreeMap<DateTime<Utc>, Vec<Bar>> = BTreeMap::new();
        for (ts, symbol_bars) in by_timestamp {
            let complete = match &policy {
                CompletenessPolicy::Strict => universe.symbols.iter().all(|s| symbol_bars.contains_key(s)),
                CompletenessPolicy::Lenient { signal_symbol } => symbol_bars.contains_key(signal_symbol.as_str()),
            };
            if !complete {
                continue;
            }
            let mut bars: Vec<Bar> = symbol_bars.into_values().collect();
            bars.sort_by(|a, b| a.symbol.cmp(&b.symbol));
            groups.insert(ts, bars);
        }

        let resolved_start = if warmup_bars > 0 {
            if let Some(start) = logical_start {
                groups
                    .range(..start)
                    .rev()
                    .nth(warmup_bars.saturating_sub(1))
                    .map(|(ts, _)| *ts)
                    .unwrap_or_else(|| groups.keys().next().copied().unwrap_or(start))
            } else {
                groups.keys().next().copied()
            }
        } else {
            logical_start.or_else(|| groups.keys().next().copied())
        };

        let groups: BTreeMap<DateTime<Utc>, Vec<Bar>> = match resolved_start {
            Some(start) => groups.into_iter().filter(|(ts, _)| *ts >= start).collect(),
            None => groups,
        };

        InMemoryDataHandler {
            groups: groups.into_iter(),
            logical_start,
        }
    }
}

impl DataHandler for InMemoryDataHandler {
    fn next_group(&mut self) -> Option<Result<(DateTime<Utc>, Vec<Bar>), TrendLabError>> {
        self.groups.next().map(Ok)
    }
}

/// Adapt any `DataHandler` into a plain `Iterator` for ergonomic `for`-loop
/// consumption by the event loop.
pub fn iter(mut handler: impl DataHandler) -> impl Iterator<Item = Result<(DateTime<Utc>, Vec<Bar>), TrendLabError>> {
    std::iter::from_fn(move || handler.next_group())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn bar(symbol: &str, day: u32, close: rust_decimal::Decimal) -> Bar {
        Bar::new(symbol, ts(day), close, close, close, close, 0).unwrap()
    }

    #[test]
    fn groups_by_timestamp_and_sorts_symbols() {
        let bars = vec![
            bar("B", 1, dec!(1)),
            bar("A", 1, dec!(2)),
            bar("A", 2, dec!(3)),
        ];
        let universe = Universe::new(["A", "B"]);
        let mut handler = InMemoryDataHandler::new(bars, &universe, CompletenessPolicy::Lenient { signal_symbol: "A".to_string() }, None, 0);

        let (_, first_group) = handler.next_group().unwrap().unwrap();
        assert_eq!(first_group[0].symbol, "A");
        assert_eq!(first_group[1].symbol, "B");
    }

    #[test]
    fn strict_policy_drops_incomplete_timestamps() {
        let bars = vec![bar("A", 1, dec!(1)), bar("A", 2, dec!(2)), bar("B", 2, dec!(2))];
        let universe = Universe::new(["A", "B"]);
        let mut handler = InMemoryDataHandler::new(bars, &universe, CompletenessPolicy::Strict, None, 0);

        let (ts1, _) = handler.next_group().unwrap().unwrap();
        assert_eq!(ts1, ts(2));
        assert!(handler.next_group().is_none());
    }

    #[test]
    fn lenient_policy_only_requires_signal_symbol() {
        let bars = vec![bar("A", 1, dec!(1)), bar("A", 2, dec!(2)), bar("B", 2, dec!(2))];
        let universe = Universe::new(["A", "B"]);
        let mut handler = InMemoryDataHandler::new(bars, &universe, CompletenessPolicy::Lenient { signal_symbol: "A".to_string() }, None, 0);

        let (ts1, group1) = handler.next_group().unwrap().unwrap();
        assert_eq!(ts1, ts(1));
        assert_eq!(group1.len(), 1);
    }

    #[test]
    fn warmup_shifts_start_back() {
        let bars: Vec<Bar> = (1..=10).map(|d| bar("A", d, dec!(1))).collect();
        let universe = Universe::new(["A"]);
        let logical_start = ts(8);
        let mut handler = InMemoryDataHandler::new(
            bars,
            &universe,
            CompletenessPolicy::Lenient { signal_symbol: "A".to_string() },
            Some(logical_start),
            3,
        );
        let (first_ts, _) = handler.next_group().unwrap().unwrap();
        assert_eq!(first_ts, ts(5));
    }

    #[test]
    fn timestamps_strictly_increase() {
        let bars: Vec<Bar> = (1..=5).map(|d| bar("A", d, dec!(1))).collect();
        let universe = Universe::new(["A"]);
        let mut handler = InMemoryDataHandler::new(bars, &universe, CompletenessPolicy::Lenient { signal_symbol: "A".to_string() }, None, 0);

        let mut last = None;
        while let Some(Ok((ts, _))) = handler.next_group() {
            if let Some(prev) = last {
                assert!(ts > prev);
            }
            last = Some(ts);
        }
    }
}
