//! Core data model (spec.md §3): symbols, candles, fibonacci levels,
//! scorecards, and position proposals. Every monetary/percentage field uses
//! `rust_decimal::Decimal` rather than `f64` so that persistence never
//! round-trips money through IEEE-754 binary floats.

pub mod candle;
pub mod fibonacci;
pub mod position;
pub mod scan;
pub mod signal;
pub mod symbol;

pub use candle::{Candle, Timeframe};
pub use fibonacci::{FibonacciLevels, MultiTimeframeFibonacci};
pub use position::{PositionProposal, PositionStatus, PositionType};
pub use scan::{BestStrategy, ScanHistory, ScanRecord, TimeframeResult, TimeframeStatus};
pub use signal::{EntryContext, FundingSentiment, FundingInfo, Signal, TrendSnapshot, TrendDirection, VolumeTrend};
pub use symbol::{InstrumentRules, SymbolInfo};

use rust_decimal::Decimal;

/// Round `price` to the nearest multiple of `tick`. Matches the source
/// system's uniform `round(price / tick) * tick`, which is also why a price
/// under half a tick snaps to zero (spec.md §8's boundary rule) rather than
/// floor-rounding, which would zero out anything under a full tick.
pub fn snap_to_tick(price: Decimal, tick: Decimal) -> Decimal {
    snap(price, tick)
}

/// Round `qty` to the nearest multiple of `step`.
pub fn snap_to_step(qty: Decimal, step: Decimal) -> Decimal {
    snap(qty, step)
}

fn snap(value: Decimal, unit: Decimal) -> Decimal {
    if unit.is_zero() {
        return value;
    }
    (value / unit).round() * unit
}

/// True if `value` is an integer multiple of `unit`, within the precision
/// `unit` itself carries (invariant I3).
pub fn is_multiple_of(value: Decimal, unit: Decimal) -> bool {
    if unit.is_zero() {
        return true;
    }
    (value % unit).is_zero()
}
