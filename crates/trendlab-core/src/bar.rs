//! Market bar: one fixed-interval OHLCV record for one symbol.

use crate::error::TrendLabError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An immutable OHLCV record for one symbol at one timestamp.
///
/// Constructed only through [`Bar::new`], which enforces the OHLC
/// invariants. Symbols carrying a `$` prefix (broker index symbols) are
/// accepted as opaque strings; the engine never special-cases them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

impl Bar {
    /// Build a bar, validating the OHLC invariants.
    ///
    /// `low <= open, close <= high`, `low <= high`, all prices `> 0`.
    pub fn new(
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: u64,
    ) -> Result<Bar, TrendLabError> {
        let symbol = symbol.into();

        if open <= Decimal::ZERO || high <= Decimal::ZERO || low <= Decimal::ZERO || close <= Decimal::ZERO {
            return Err(TrendLabError::InvalidBar {
                reason: format!("{symbol}@{timestamp}: all prices must be > 0"),
            });
        }
        if low > high {
            return Err(TrendLabError::InvalidBar {
                reason: format!("{symbol}@{timestamp}: low ({low}) > high ({high})"),
            });
        }
        if low > open || low > close || open > high || close > high {
            return Err(TrendLabError::InvalidBar {
                reason: format!(
                    "{symbol}@{timestamp}: OHLC invariant violated (open={open}, high={high}, low={low}, close={close})"
                ),
            });
        }

        Ok(Bar {
            symbol,
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn valid_bar_constructs() {
        let bar = Bar::new("X", ts(1), dec!(100), dec!(105), dec!(95), dec!(102), 1_000).unwrap();
        assert_eq!(bar.close, dec!(102));
    }

    #[test]
    fn dollar_prefixed_symbol_is_opaque() {
        let bar = Bar::new("$VIX", ts(1), dec!(20), dec!(21), dec!(19), dec!(20), 0).unwrap();
        assert_eq!(bar.symbol, "$VIX");
    }

    #[test]
    fn rejects_negative_or_zero_price() {
        let err = Bar::new("X", ts(1), dec!(0), dec!(1), dec!(0), dec!(1), 0).unwrap_err();
        assert!(matches!(err, TrendLabError::InvalidBar { .. }));
    }

    #[test]
    fn rejects_low_above_high() {
        let err = Bar::new("X", ts(1), dec!(100), dec!(95), dec!(99), dec!(96), 0).unwrap_err();
        assert!(matches!(err, TrendLabError::InvalidBar { .. }));
    }

    #[test]
    fn rejects_open_outside_range() {
        let err = Bar::new("X", ts(1), dec!(200), dec!(150), dec!(90), dec!(100), 0).unwrap_err();
        assert!(matches!(err, TrendLabError::InvalidBar { .. }));
    }

    #[test]
    fn rejects_close_outside_range() {
        let err = Bar::new("X", ts(1), dec!(100), dec!(110), dec!(90), dec!(200), 0).unwrap_err();
        assert!(matches!(err, TrendLabError::InvalidBar { .. }));
    }

    #[test]
    fn accepts_zero_volume() {
        let bar = Bar::new("X", ts(1), dec!(1), dec!(1), dec!(1), dec!(1), 0).unwrap();
        assert_eq!(bar.volume, 0);
    }

    #[test]
    fn round_trip_serialization_is_identity() {
        let bar = Bar::new("X", ts(1), dec!(100.25), dec!(105.50), dec!(95.10), dec!(102.75), 12_345).unwrap();
        let csv_row = format!(
            "{},{},{},{},{},{},{}",
            bar.symbol, bar.timestamp.to_rfc3339(), bar.open, bar.high, bar.low, bar.close, bar.volume
        );
        let fields: Vec<&str> = csv_row.split(',').collect();
        let parsed = Bar::new(
            fields[0],
            DateTime::parse_from_rfc3339(fields[1]).unwrap().with_timezone(&Utc),
            fields[2].parse().unwrap(),
            fields[3].parse().unwrap(),
            fields[4].parse().unwrap(),
            fields[5].parse().unwrap(),
            fields[6].parse().unwrap(),
        )
        .unwrap();
        assert_eq!(parsed, bar);
    }
}
