//! BTC market-wide and per-coin trend classification (spec.md §4.2).
//!
//! Formulas are grounded in the original system's trend analyzer: BTC uses
//! a 60-bar 1-minute window with a 0.3% breakout threshold and a x10
//! price-change multiplier; coin trend uses a 30-bar window with a 0.5%
//! threshold and a x5 multiplier. Both share the same sideways-strength
//! formula.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::indicators::{closes, sma};
use crate::types::signal::{TrendDirection, TrendSnapshot, VolumeTrend};
use crate::types::Candle;

fn ma_diff_pct(ma5: Decimal, ma20: Decimal) -> Decimal {
    if ma20 > Decimal::ZERO {
        (ma5 - ma20) / ma20 * dec!(100)
    } else {
        Decimal::ZERO
    }
}

fn classify(
    ma5: Decimal,
    ma20: Decimal,
    price_change_pct: Decimal,
    breakout_threshold: Decimal,
    strength_multiplier: Decimal,
) -> (TrendDirection, Decimal) {
    let diff_pct = ma_diff_pct(ma5, ma20);
    if ma5 > ma20 && price_change_pct > breakout_threshold {
        let strength = (diff_pct.abs() * dec!(50) + price_change_pct.abs() * strength_multiplier).min(dec!(100));
        (TrendDirection::Uptrend, strength)
    } else if ma5 < ma20 && price_change_pct < -breakout_threshold {
        let strength = (diff_pct.abs() * dec!(50) + price_change_pct.abs() * strength_multiplier).min(dec!(100));
        (TrendDirection::Downtrend, strength)
    } else {
        let strength = dec!(50) - (diff_pct.abs() * dec!(25)).min(dec!(50));
        (TrendDirection::Sideways, strength)
    }
}

/// BTC market-wide trend over the last `window` 1-minute candles (default
/// 60). Needs at least 20 candles; returns `TrendSnapshot::unknown()`
/// otherwise.
pub fn btc_trend(candles: &[Candle], window: usize) -> TrendSnapshot {
    if candles.len() < 20 {
        return TrendSnapshot::unknown();
    }
    let recent = &candles[candles.len().saturating_sub(window)..];
    let values = closes(recent);
    if values.len() < 20 {
        return TrendSnapshot::unknown();
    }
    let (Some(ma5), Some(ma20)) = (sma(&values, 5), sma(&values, 20)) else {
        return TrendSnapshot::unknown();
    };
    let first = recent.first().unwrap().close;
    let last = recent.last().unwrap().close;
    let price_change_pct = if first.is_zero() {
        Decimal::ZERO
    } else {
        (last - first) / first * dec!(100)
    };
    let (trend, strength) = classify(ma5, ma20, price_change_pct, dec!(0.3), dec!(10));
    TrendSnapshot {
        trend,
        strength,
        price_change_pct,
        ma5,
        ma20,
        volume_trend: VolumeTrend::Unknown,
    }
}

/// Per-coin trend over the last `window` candles (default 30), including
/// volume-trend direction (first half vs. second half average volume).
pub fn coin_trend(candles: &[Candle], window: usize) -> TrendSnapshot {
    if candles.len() < 20 {
        return TrendSnapshot::unknown();
    }
    let recent = &candles[candles.len().saturating_sub(window)..];
    let values = closes(recent);
    if values.len() < 20 {
        return TrendSnapshot::unknown();
    }
    let (Some(ma5), Some(ma20)) = (sma(&values, 5), sma(&values, 20)) else {
        return TrendSnapshot::unknown();
    };
    let first = recent.first().unwrap().close;
    let last = recent.last().unwrap().close;
    let price_change_pct = if first.is_zero() {
        Decimal::ZERO
    } else {
        (last - first) / first * dec!(100)
    };

    let mid = recent.len() / 2;
    let first_half_avg = average_volume(&recent[..mid]);
    let second_half_avg = average_volume(&recent[mid..]);
    let volume_trend = if second_half_avg > first_half_avg {
        VolumeTrend::Increasing
    } else {
        VolumeTrend::Decreasing
    };

    let (trend, strength) = classify(ma5, ma20, price_change_pct, dec!(0.5), dec!(5));
    TrendSnapshot {
        trend,
        strength,
        price_change_pct,
        ma5,
        ma20,
        volume_trend,
    }
}

fn average_volume(candles: &[Candle]) -> Decimal {
    if candles.is_empty() {
        return Decimal::ZERO;
    }
    let sum: Decimal = candles.iter().map(|c| c.volume).sum();
    sum / Decimal::from(candles.len())
}

/// Long-entry gate: BTC must not be in a strong downtrend, coin must not
/// be in a downtrend (spec.md §4.2's "uptrend filter").
pub fn should_enter_long(btc: &TrendSnapshot, coin: &TrendSnapshot) -> bool {
    if btc.trend == TrendDirection::Downtrend && btc.strength > dec!(60) {
        return false;
    }
    if coin.trend == TrendDirection::Downtrend {
        return false;
    }
    coin.trend == TrendDirection::Uptrend
}

/// Short-entry gate: the mirror image of [`should_enter_long`].
pub fn should_enter_short(btc: &TrendSnapshot, coin: &TrendSnapshot) -> bool {
    if btc.trend == TrendDirection::Uptrend && btc.strength > dec!(60) {
        return false;
    }
    if coin.trend == TrendDirection::Uptrend {
        return false;
    }
    coin.trend == TrendDirection::Downtrend
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn candle(minute: i64, close: Decimal, volume: Decimal) -> Candle {
        Candle {
            open_time: DateTime::<Utc>::from_timestamp(minute * 60, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume,
            turnover: close * volume,
        }
    }

    fn rising_series(n: i64) -> Vec<Candle> {
        (0..n)
            .map(|i| candle(i, dec!(100) + Decimal::from(i) * dec!(0.5), dec!(10) + Decimal::from(i)))
            .collect()
    }

    #[test]
    fn short_history_is_unknown() {
        let candles = rising_series(10);
        let snap = btc_trend(&candles, 60);
        assert_eq!(snap.trend, TrendDirection::Unknown);
    }

    #[test]
    fn rising_series_classified_uptrend() {
        let candles = rising_series(60);
        let snap = btc_trend(&candles, 60);
        assert_eq!(snap.trend, TrendDirection::Uptrend);
        assert!(snap.strength > Decimal::ZERO);
    }

    #[test]
    fn flat_series_is_sideways() {
        let candles: Vec<Candle> = (0..40).map(|i| candle(i, dec!(100), dec!(10))).collect();
        let snap = coin_trend(&candles, 30);
        assert_eq!(snap.trend, TrendDirection::Sideways);
    }

    #[test]
    fn long_gate_blocks_on_btc_strong_downtrend() {
        let btc = TrendSnapshot {
            trend: TrendDirection::Downtrend,
            strength: dec!(70),
            ..TrendSnapshot::unknown()
        };
        let coin = TrendSnapshot {
            trend: TrendDirection::Uptrend,
            ..TrendSnapshot::unknown()
        };
        assert!(!should_enter_long(&btc, &coin));
    }

    /// Scenario S2 (spec.md §8): a short setup mirrored upward with BTC in
    /// a strength-70 uptrend must be rejected by the gate regardless of the
    /// coin's own downtrend.
    #[test]
    fn s2_short_gate_blocks_on_btc_strong_uptrend() {
        let btc = TrendSnapshot {
            trend: TrendDirection::Uptrend,
            strength: dec!(70),
            ..TrendSnapshot::unknown()
        };
        let coin = TrendSnapshot {
            trend: TrendDirection::Downtrend,
            ..TrendSnapshot::unknown()
        };
        assert!(!should_enter_short(&btc, &coin));
    }
}
