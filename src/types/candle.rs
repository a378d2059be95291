//! Candle sequences, keyed by open-time, and the supported timeframes
//! (spec.md §3).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A supported candle timeframe: a minute count, or daily.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    Minutes(u32),
    Day,
}

impl Timeframe {
    pub const ALL_MINUTE: [u32; 7] = [1, 3, 5, 15, 30, 60, 240];

    /// Exchange-facing interval label ("1", "3", ..., "240", "D").
    pub fn label(&self) -> String {
        match self {
            Timeframe::Minutes(m) => m.to_string(),
            Timeframe::Day => "D".to_string(),
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        if label.eq_ignore_ascii_case("d") {
            return Some(Timeframe::Day);
        }
        label.parse::<u32>().ok().map(Timeframe::Minutes)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One OHLCV bar, keyed by open-time (UTC). Candle history is append-only
/// and deduplicated on open-time; this type carries one row of that
/// sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub turnover: Decimal,
}

/// Deduplicate a candle history on open-time, keeping the first occurrence,
/// then sort ascending. Used when merging chunked history fetches (spec.md
/// §3: "history is requested in chunks of up to 200 rows and deduplicated
/// on open-time").
pub fn merge_candles(mut candles: Vec<Candle>) -> Vec<Candle> {
    candles.sort_by_key(|c| c.open_time);
    candles.dedup_by_key(|c| c.open_time);
    candles
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle_at(minute: i64) -> Candle {
        Candle {
            open_time: DateTime::from_timestamp(minute * 60, 0).unwrap(),
            open: dec!(1),
            high: dec!(1),
            low: dec!(1),
            close: dec!(1),
            volume: dec!(1),
            turnover: dec!(1),
        }
    }

    #[test]
    fn merge_dedups_and_sorts() {
        let merged = merge_candles(vec![candle_at(3), candle_at(1), candle_at(3), candle_at(2)]);
        let times: Vec<i64> = merged.iter().map(|c| c.open_time.timestamp() / 60).collect();
        assert_eq!(times, vec![1, 2, 3]);
    }

    #[test]
    fn timeframe_label_roundtrips() {
        assert_eq!(Timeframe::parse("15"), Some(Timeframe::Minutes(15)));
        assert_eq!(Timeframe::parse("D"), Some(Timeframe::Day));
        assert_eq!(Timeframe::Day.label(), "D");
    }
}
