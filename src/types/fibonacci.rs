//! Multi-timeframe fibonacci retracement levels (spec.md §3).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::candle::{Candle, Timeframe};

/// The seven retracement ratios computed for every timeframe.
pub const RATIOS: [&str; 7] = ["0.0", "0.236", "0.382", "0.5", "0.618", "0.786", "1.0"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FibonacciLevels {
    pub high: Decimal,
    pub low: Decimal,
    pub range: Decimal,
    pub levels: HashMap<String, Decimal>,
}

impl FibonacciLevels {
    /// Compute retracement levels from a high/low range: `low + range * ratio`
    /// for each ratio in [0, 0.236, 0.382, 0.5, 0.618, 0.786, 1.0].
    pub fn from_range(high: Decimal, low: Decimal) -> Self {
        let range = high - low;
        let ratios: [(&str, Decimal); 7] = [
            ("0.0", Decimal::new(0, 0)),
            ("0.236", Decimal::new(236, 3)),
            ("0.382", Decimal::new(382, 3)),
            ("0.5", Decimal::new(5, 1)),
            ("0.618", Decimal::new(618, 3)),
            ("0.786", Decimal::new(786, 3)),
            ("1.0", Decimal::new(1, 0)),
        ];
        let levels = ratios
            .into_iter()
            .map(|(name, ratio)| (name.to_string(), low + range * ratio))
            .collect();
        Self {
            high,
            low,
            range,
            levels,
        }
    }

    /// Compute levels from a candle window: high/low over the whole window.
    pub fn from_candles(candles: &[Candle]) -> Option<Self> {
        let high = candles.iter().map(|c| c.high).max()?;
        let low = candles.iter().map(|c| c.low).min()?;
        Some(Self::from_range(high, low))
    }
}

/// A symbol's fibonacci levels across its configured timeframe/lookback
/// pairs. Immutable per invocation: computed once from a historical window
/// and not mutated afterward.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultiTimeframeFibonacci {
    pub by_timeframe: HashMap<String, FibonacciLevels>,
}

/// Default lookback window (in days of 1-minute-equivalent candles) per
/// timeframe, per spec.md §3: 5m:1d, 15m:2d, 30m:5d, 240m:7d, D:30d.
pub fn default_lookback_days(tf: Timeframe) -> u32 {
    match tf {
        Timeframe::Minutes(5) => 1,
        Timeframe::Minutes(15) => 2,
        Timeframe::Minutes(30) => 5,
        Timeframe::Minutes(240) => 7,
        Timeframe::Day => 30,
        _ => 1,
    }
}

impl MultiTimeframeFibonacci {
    /// Union of every level across every timeframe, keyed by level name.
    /// Later timeframes overwrite earlier ones on an exact ratio collision,
    /// matching the Python source's `dict.update` merge.
    pub fn union_levels(&self) -> HashMap<String, Decimal> {
        let mut all = HashMap::new();
        for fib in self.by_timeframe.values() {
            all.extend(fib.levels.clone());
        }
        all
    }

    pub fn is_empty(&self) -> bool {
        self.by_timeframe.is_empty()
    }
}
