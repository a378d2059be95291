//! Multi-factor entry signal engine (spec.md §4.2).
//!
//! Evaluates five named strategies in priority order against one symbol's
//! latest candle, stopping at the first that fires:
//!   A. downtrend-short-advanced   (confidence >= 80)
//!   B. uptrend-long-advanced      (confidence >= 80)
//!   C. support-bounce-long-advanced (confidence >= 85)
//!   D. basic-long                 (confidence == 60)
//!   E. basic-short                (confidence == 60)
//! Grounded in the original system's `entry_strategy.py` and
//! `advanced_signal_analyzer.py`: the composite scoring and gating
//! arithmetic below reproduces those functions' thresholds exactly.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

use crate::config::TradingConfig;
use crate::indicators::{bb_position as bb_pos_ratio, bollinger_bands, closes, rsi};
use crate::trend::{should_enter_long, should_enter_short};
use crate::types::signal::{
    BestStrategy, DirectionalSignal, FundingInfo, FundingSentiment, Signal, StrategyKind, TrendDirection,
    TrendSnapshot,
};
use crate::types::{snap_to_tick, Candle, InstrumentRules};

const NEAR_FIB_RATIOS: [&str; 4] = ["0.382", "0.5", "0.618", "0.786"];

struct FibLevel {
    name: String,
    price: Decimal,
    distance_pct: Decimal,
}

struct FibDistance {
    nearest_support: Option<FibLevel>,
    nearest_resistance: Option<FibLevel>,
}

impl FibDistance {
    fn has_room_to_fall(&self) -> bool {
        self.nearest_support.as_ref().is_some_and(|s| s.distance_pct > dec!(1.0))
    }

    fn has_room_to_rise(&self) -> bool {
        self.nearest_resistance
            .as_ref()
            .is_some_and(|r| r.distance_pct > dec!(1.0))
    }
}

fn analyze_fib_distance(current_price: Decimal, fib_levels: &HashMap<String, Decimal>) -> Option<FibDistance> {
    if fib_levels.is_empty() {
        return None;
    }
    let nearest_support = fib_levels
        .iter()
        .filter(|(_, price)| **price < current_price)
        .max_by_key(|(_, price)| **price)
        .map(|(name, price)| FibLevel {
            name: name.clone(),
            price: *price,
            distance_pct: (current_price - *price) / current_price * dec!(100),
        });
    let nearest_resistance = fib_levels
        .iter()
        .filter(|(_, price)| **price > current_price)
        .min_by_key(|(_, price)| **price)
        .map(|(name, price)| FibLevel {
            name: name.clone(),
            price: *price,
            distance_pct: (*price - current_price) / current_price * dec!(100),
        });
    Some(FibDistance {
        nearest_support,
        nearest_resistance,
    })
}

fn is_near_fibonacci_level(
    price: Decimal,
    fib_levels: &HashMap<String, Decimal>,
    tolerance: Decimal,
) -> Option<(String, Decimal)> {
    for name in NEAR_FIB_RATIOS {
        if let Some(level_price) = fib_levels.get(name) {
            if price.is_zero() {
                continue;
            }
            let diff_pct = (price - *level_price).abs() / price;
            if diff_pct <= tolerance {
                return Some((name.to_string(), *level_price));
            }
        }
    }
    None
}

struct Economics {
    entry_price: Decimal,
    stop_loss: Decimal,
    take_profit: Decimal,
    expected_profit: Decimal,
    expected_loss: Decimal,
    net_profit: Decimal,
}

/// Round entry/stop/take to the symbol's tick, then compute leveraged
/// expected profit/loss and fees. `long` picks the stop-below/take-above
/// convention; false mirrors it for shorts.
fn compute_economics(raw_entry: Decimal, rules: &InstrumentRules, config: &TradingConfig, long: bool) -> Option<Economics> {
    if raw_entry.is_zero() {
        return None;
    }
    let entry_price = snap_to_tick(raw_entry, rules.price_tick);
    if entry_price.is_zero() {
        return None;
    }
    let stop_pct = config.stop_loss_pct / dec!(100);
    let take_pct = config.take_profit_pct / dec!(100);

    let (stop_loss, take_profit) = if long {
        (
            snap_to_tick(entry_price * (Decimal::ONE - stop_pct), rules.price_tick),
            snap_to_tick(entry_price * (Decimal::ONE + take_pct), rules.price_tick),
        )
    } else {
        (
            snap_to_tick(entry_price * (Decimal::ONE + stop_pct), rules.price_tick),
            snap_to_tick(entry_price * (Decimal::ONE - take_pct), rules.price_tick),
        )
    };

    let expected_profit = config.position_size * take_pct * Decimal::from(config.leverage);
    let expected_loss = config.position_size * stop_pct * Decimal::from(config.leverage);
    let entry_fee = config.position_size * Decimal::from(config.leverage) * config.taker_fee;
    let total_fee = entry_fee * dec!(2);
    let net_profit = expected_profit - total_fee;

    if net_profit < config.min_profit_target {
        return None;
    }

    Some(Economics {
        entry_price,
        stop_loss,
        take_profit,
        expected_profit,
        expected_loss,
        net_profit,
    })
}

fn directional_signal(
    strategy: StrategyKind,
    confidence: Decimal,
    econ: Economics,
    rsi_value: Decimal,
    bb_position: Decimal,
    bb_width: Decimal,
    timestamp: chrono::DateTime<chrono::Utc>,
) -> DirectionalSignal {
    DirectionalSignal {
        strategy,
        confidence,
        entry_price: econ.entry_price,
        stop_loss: econ.stop_loss,
        take_profit: econ.take_profit,
        expected_profit: econ.expected_profit,
        expected_loss: econ.expected_loss,
        fees: econ.expected_profit - econ.net_profit,
        net_profit: econ.net_profit,
        rsi: rsi_value,
        bb_position,
        bb_width,
        timestamp,
    }
}

/// Strategy A: short on an established downtrend with room left to fall.
#[allow(clippy::too_many_arguments)]
fn downtrend_short_advanced(
    close: Decimal,
    fib_levels: &HashMap<String, Decimal>,
    btc_trend: &TrendSnapshot,
    coin_trend: &TrendSnapshot,
    funding: &FundingInfo,
    rsi_value: Decimal,
) -> Option<Decimal> {
    if coin_trend.trend != TrendDirection::Downtrend {
        return None;
    }
    let fib = analyze_fib_distance(close, fib_levels)?;
    if !fib.has_room_to_fall() {
        return None;
    }
    let mut confidence = dec!(30) + dec!(25);

    if btc_trend.trend == TrendDirection::Uptrend && btc_trend.strength > dec!(60) {
        return None;
    }
    confidence += if btc_trend.trend == TrendDirection::Downtrend {
        dec!(20)
    } else {
        dec!(10)
    };

    match funding.sentiment {
        FundingSentiment::LongHeavy => confidence += dec!(15),
        FundingSentiment::ShortHeavy => confidence -= dec!(10),
        FundingSentiment::Neutral => {}
    }

    if rsi_value < dec!(30) {
        return None;
    }
    if rsi_value > dec!(50) {
        confidence += dec!(10);
    }

    (confidence >= dec!(80)).then_some(confidence)
}

/// Strategy B: long on an established uptrend with room left to rise.
#[allow(clippy::too_many_arguments)]
fn uptrend_long_advanced(
    close: Decimal,
    fib_levels: &HashMap<String, Decimal>,
    btc_trend: &TrendSnapshot,
    coin_trend: &TrendSnapshot,
    funding: &FundingInfo,
    rsi_value: Decimal,
) -> Option<Decimal> {
    if coin_trend.trend != TrendDirection::Uptrend {
        return None;
    }
    let fib = analyze_fib_distance(close, fib_levels)?;
    if !fib.has_room_to_rise() {
        return None;
    }
    let mut confidence = dec!(30) + dec!(25);

    if btc_trend.trend == TrendDirection::Downtrend && btc_trend.strength > dec!(60) {
        return None;
    }
    confidence += if btc_trend.trend == TrendDirection::Uptrend {
        dec!(20)
    } else {
        dec!(10)
    };

    match funding.sentiment {
        FundingSentiment::ShortHeavy => confidence += dec!(15),
        FundingSentiment::LongHeavy => confidence -= dec!(10),
        FundingSentiment::Neutral => {}
    }

    if rsi_value > dec!(70) {
        return None;
    }
    if rsi_value < dec!(50) {
        confidence += dec!(10);
    }

    (confidence >= dec!(80)).then_some(confidence)
}

/// Strategy C: long off a fibonacci support bounce during oversold RSI.
#[allow(clippy::too_many_arguments)]
fn support_bounce_long_advanced(
    close: Decimal,
    fib_levels: &HashMap<String, Decimal>,
    btc_trend: &TrendSnapshot,
    funding: &FundingInfo,
    rsi_value: Decimal,
    bb_position: Decimal,
) -> Option<Decimal> {
    let fib = analyze_fib_distance(close, fib_levels)?;
    let support = fib.nearest_support?;
    if support.distance_pct > dec!(1.0) {
        return None;
    }
    let mut confidence = dec!(30);

    if rsi_value > dec!(35) {
        return None;
    }
    confidence += dec!(25);

    if bb_position > dec!(0.2) {
        return None;
    }
    confidence += dec!(20);

    if btc_trend.trend == TrendDirection::Downtrend && btc_trend.strength > dec!(70) {
        return None;
    }
    confidence += if btc_trend.trend == TrendDirection::Uptrend {
        dec!(15)
    } else {
        dec!(5)
    };

    if funding.sentiment == FundingSentiment::ShortHeavy {
        confidence += dec!(10);
    }

    (confidence >= dec!(85)).then_some(confidence)
}

fn is_hammer(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> bool {
    let body = (close - open).abs();
    let lower_shadow = open.min(close) - low;
    let upper_shadow = high - open.max(close);
    lower_shadow > body * dec!(2) && upper_shadow < body * dec!(0.5)
}

fn is_shooting_star(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> bool {
    let body = (close - open).abs();
    let lower_shadow = open.min(close) - low;
    let upper_shadow = high - open.max(close);
    upper_shadow > body * dec!(2) && lower_shadow < body * dec!(0.5)
}

/// Strategy D: basic long — bollinger lower bounce with trend/fib confirmation.
fn check_long_signal(
    candles: &[Candle],
    fib_union: &HashMap<String, Decimal>,
    config: &TradingConfig,
) -> Option<(Decimal, Decimal, Decimal)> {
    let latest = candles.last()?;
    let prev = candles.get(candles.len().checked_sub(2)?)?;
    let values = closes(candles);
    let bands = bollinger_bands(&values, config.bb_period, config.bb_std)?;
    let rsi_latest = rsi(&values, 14)?;
    let rsi_prev = rsi(&values[..values.len() - 1], 14)?;

    let bb_lower_break = latest.close <= bands.lower * dec!(1.015);
    let bb_width_ok = bands.width_pct > dec!(1.5);

    let rsi_oversold = rsi_latest < dec!(35);
    let rsi_bouncing = rsi_latest > rsi_prev;
    let rsi_signal = rsi_oversold && rsi_bouncing;

    let values_for_trend = &values;
    let uptrend = if values_for_trend.len() >= 20 {
        let ma5 = crate::indicators::sma(values_for_trend, 5);
        let ma20 = crate::indicators::sma(values_for_trend, 20);
        matches!((ma5, ma20), (Some(a), Some(b)) if a > b)
    } else {
        true
    };

    let fib_signal = is_near_fibonacci_level(latest.close, fib_union, config.fib_tolerance).is_some();

    let strong_bounce = latest.close > prev.low
        && latest.close > latest.open
        && !latest.open.is_zero()
        && (latest.close - latest.open) / latest.open > dec!(0.002);

    let hammer = is_hammer(latest.open, latest.high, latest.low, latest.close);

    if bb_lower_break && bb_width_ok && (rsi_signal || fib_signal) && uptrend && (strong_bounce || hammer) {
        let bb_position = bb_pos_ratio(latest.close, &bands);
        return Some((rsi_latest, bb_position, bands.width_pct));
    }
    None
}

/// Strategy E: basic short — the mirror image of [`check_long_signal`].
fn check_short_signal(
    candles: &[Candle],
    fib_union: &HashMap<String, Decimal>,
    config: &TradingConfig,
) -> Option<(Decimal, Decimal, Decimal)> {
    let latest = candles.last()?;
    let prev = candles.get(candles.len().checked_sub(2)?)?;
    let values = closes(candles);
    let bands = bollinger_bands(&values, config.bb_period, config.bb_std)?;
    let rsi_latest = rsi(&values, 14)?;
    let rsi_prev = rsi(&values[..values.len() - 1], 14)?;

    let bb_upper_break = latest.close >= bands.upper * dec!(0.985);
    let bb_width_ok = bands.width_pct > dec!(1.5);

    let rsi_overbought = rsi_latest > dec!(65);
    let rsi_falling = rsi_latest < rsi_prev;
    let rsi_signal = rsi_overbought && rsi_falling;

    let downtrend = if values.len() >= 20 {
        let ma5 = crate::indicators::sma(&values, 5);
        let ma20 = crate::indicators::sma(&values, 20);
        matches!((ma5, ma20), (Some(a), Some(b)) if a < b)
    } else {
        true
    };

    let fib_signal = is_near_fibonacci_level(latest.close, fib_union, config.fib_tolerance).is_some();

    let strong_drop = latest.close < prev.high
        && latest.close < latest.open
        && !latest.open.is_zero()
        && (latest.open - latest.close) / latest.open > dec!(0.002);

    let shooting_star = is_shooting_star(latest.open, latest.high, latest.low, latest.close);

    if bb_upper_break && bb_width_ok && (rsi_signal || fib_signal) && downtrend && (strong_drop || shooting_star) {
        let bb_position = bb_pos_ratio(latest.close, &bands);
        return Some((rsi_latest, bb_position, bands.width_pct));
    }
    None
}

/// Evaluate all five strategies in priority order against the latest bar
/// and return the first signal that fires, or `Signal::None`.
pub fn evaluate(
    candles: &[Candle],
    rules: &InstrumentRules,
    fib_union: &HashMap<String, Decimal>,
    btc_trend: &TrendSnapshot,
    coin_trend: &TrendSnapshot,
    funding: &FundingInfo,
    config: &TradingConfig,
) -> Signal {
    if candles.len() < config.bb_period + 10 {
        return Signal::None;
    }
    let latest = candles.last().expect("checked length above");
    let values = closes(candles);
    let Some(bands) = bollinger_bands(&values, config.bb_period, config.bb_std) else {
        return Signal::None;
    };
    let Some(rsi_value) = rsi(&values, 14) else {
        return Signal::None;
    };

    if let Some(confidence) = downtrend_short_advanced(latest.close, fib_union, btc_trend, coin_trend, funding, rsi_value) {
        if let Some(econ) = compute_economics(latest.close, rules, config, false) {
            let bb_position = bb_pos_ratio(econ.entry_price, &bands);
            return Signal::Short(directional_signal(
                StrategyKind::DowntrendShort,
                confidence,
                econ,
                rsi_value,
                bb_position,
                bands.width_pct,
                latest.open_time,
            ));
        }
    }

    if let Some(confidence) = uptrend_long_advanced(latest.close, fib_union, btc_trend, coin_trend, funding, rsi_value) {
        if let Some(econ) = compute_economics(latest.close, rules, config, true) {
            let bb_position = bb_pos_ratio(econ.entry_price, &bands);
            return Signal::Long(directional_signal(
                StrategyKind::UptrendLong,
                confidence,
                econ,
                rsi_value,
                bb_position,
                bands.width_pct,
                latest.open_time,
            ));
        }
    }

    let bb_position_latest = bb_pos_ratio(latest.close, &bands);
    if let Some(confidence) = support_bounce_long_advanced(latest.close, fib_union, btc_trend, funding, rsi_value, bb_position_latest) {
        if let Some(econ) = compute_economics(latest.close, rules, config, true) {
            let bb_position = bb_pos_ratio(econ.entry_price, &bands);
            return Signal::Long(directional_signal(
                StrategyKind::SupportBounceLong,
                confidence,
                econ,
                rsi_value,
                bb_position,
                bands.width_pct,
                latest.open_time,
            ));
        }
    }

    if let Some((rsi_value, bb_position, bb_width)) = check_long_signal(candles, fib_union, config) {
        if should_enter_long(btc_trend, coin_trend) {
            if let Some(econ) = compute_economics(latest.close, rules, config, true) {
                return Signal::Long(directional_signal(
                    StrategyKind::BasicLong,
                    dec!(60),
                    econ,
                    rsi_value,
                    bb_position,
                    bb_width,
                    latest.open_time,
                ));
            }
        }
    }

    if let Some((rsi_value, bb_position, bb_width)) = check_short_signal(candles, fib_union, config) {
        if should_enter_short(btc_trend, coin_trend) {
            if let Some(econ) = compute_economics(latest.close, rules, config, false) {
                return Signal::Short(directional_signal(
                    StrategyKind::BasicShort,
                    dec!(60),
                    econ,
                    rsi_value,
                    bb_position,
                    bb_width,
                    latest.open_time,
                ));
            }
        }
    }

    Signal::None
}

/// Nearest fibonacci support/resistance prices below/above `price`, for
/// attaching to a `PositionProposal` (spec.md §4.5).
pub fn nearest_fib_prices(price: Decimal, fib_levels: &HashMap<String, Decimal>) -> (Option<Decimal>, Option<Decimal>) {
    match analyze_fib_distance(price, fib_levels) {
        Some(dist) => (
            dist.nearest_support.map(|l| l.price),
            dist.nearest_resistance.map(|l| l.price),
        ),
        None => (None, None),
    }
}

pub fn classify(signal: &Signal) -> BestStrategy {
    match signal {
        Signal::None => BestStrategy::None,
        Signal::Long(s) | Signal::Short(s) => s.strategy.classify(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn candle(i: i64, close: Decimal) -> Candle {
        Candle {
            open_time: DateTime::<Utc>::from_timestamp(i * 60, 0).unwrap(),
            open: close,
            high: close * dec!(1.001),
            low: close * dec!(0.999),
            close,
            volume: dec!(1000),
            turnover: dec!(1000) * close,
        }
    }

    fn rules() -> InstrumentRules {
        InstrumentRules {
            price_tick: dec!(0.01),
            min_price: dec!(0.01),
            qty_step: dec!(0.001),
            min_qty: dec!(0.001),
            max_qty: dec!(1000),
            price_decimals: 2,
            qty_decimals: 3,
        }
    }

    #[test]
    fn too_short_history_yields_no_signal() {
        let candles: Vec<Candle> = (0..10).map(|i| candle(i, dec!(100))).collect();
        let signal = evaluate(
            &candles,
            &rules(),
            &HashMap::new(),
            &TrendSnapshot::unknown(),
            &TrendSnapshot::unknown(),
            &FundingInfo::neutral(),
            &TradingConfig::default(),
        );
        assert!(!signal.is_some());
    }

    #[test]
    fn flat_market_yields_no_signal() {
        let candles: Vec<Candle> = (0..40).map(|i| candle(i, dec!(100))).collect();
        let signal = evaluate(
            &candles,
            &rules(),
            &HashMap::new(),
            &TrendSnapshot::unknown(),
            &TrendSnapshot::unknown(),
            &FundingInfo::neutral(),
            &TradingConfig::default(),
        );
        assert!(!signal.is_some());
    }

    #[test]
    fn fib_distance_identifies_nearest_levels() {
        let mut levels = HashMap::new();
        levels.insert("0.382".to_string(), dec!(95));
        levels.insert("0.618".to_string(), dec!(105));
        let dist = analyze_fib_distance(dec!(100), &levels).unwrap();
        assert_eq!(dist.nearest_support.unwrap().price, dec!(95));
        assert_eq!(dist.nearest_resistance.unwrap().price, dec!(105));
    }

    /// Scenario S1 (spec.md §8): BTCUSDT at tick 0.1, leverage 10, position
    /// 100, stop 1%/take 2%, taker 0.06% both sides. A LONG firing at
    /// close=100.4 must land on the documented entry/stop/take/net_profit
    /// numbers exactly.
    #[test]
    fn s1_economics_matches_documented_numbers() {
        let rules = InstrumentRules {
            price_tick: dec!(0.1),
            ..rules()
        };
        let econ = compute_economics(dec!(100.4), &rules, &TradingConfig::default(), true).unwrap();
        assert_eq!(econ.entry_price, dec!(100.4));
        assert_eq!(econ.stop_loss, dec!(99.4));
        assert_eq!(econ.take_profit, dec!(102.4));
        assert_eq!(econ.expected_profit, dec!(20));
        assert_eq!(econ.expected_profit - econ.net_profit, dec!(1.2));
        assert_eq!(econ.net_profit, dec!(18.8));
    }

    /// Scenario S3 (spec.md §8): coin at 50.02, fib 0.618 at 49.60 (0.84%
    /// below), RSI=28, bb_position=0.10, BTC SIDEWAYS strength=30, funding
    /// SHORT_HEAVY. Contributions 30+25+20+5+10=90 >= gate 85.
    #[test]
    fn s3_support_bounce_confidence_matches_documented_90() {
        let mut fib_levels = HashMap::new();
        fib_levels.insert("0.618".to_string(), dec!(49.60));
        let btc_trend = TrendSnapshot {
            trend: TrendDirection::Sideways,
            strength: dec!(30),
            ..TrendSnapshot::unknown()
        };
        let funding = FundingInfo {
            funding_rate: dec!(0.01),
            sentiment: FundingSentiment::ShortHeavy,
        };

        let confidence = support_bounce_long_advanced(dec!(50.02), &fib_levels, &btc_trend, &funding, dec!(28), dec!(0.10));

        assert_eq!(confidence, Some(dec!(90)));
    }
}
