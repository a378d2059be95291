//! Bar-by-bar trade simulation and per-timeframe aggregation (spec.md §4.3).
//!
//! Grounded in the original system's `backtest_engine.py::_simulate_trade`:
//! for both LONG and SHORT positions the stop-loss is checked before the
//! take-profit on every subsequent bar, a pessimistic tie-break when a
//! single bar's range straddles both levels.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

use crate::config::TradingConfig;
use crate::types::signal::{BestStrategy, DirectionalSignal, StrategyKind};
use crate::types::scan::{TimeframeResult, TimeframeStatus};
use crate::types::{Candle, PositionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeResult {
    Win,
    Loss,
}

#[derive(Debug, Clone)]
pub struct BacktestTrade {
    pub position_type: PositionType,
    pub strategy: StrategyKind,
    pub confidence: Decimal,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub gross_pnl: Decimal,
    pub fees: Decimal,
    pub net_pnl: Decimal,
    pub result: TradeResult,
    pub bars_held: usize,
}

fn settle(
    entry_price: Decimal,
    exit_price: Decimal,
    position_size: Decimal,
    leverage: u32,
    taker_fee: Decimal,
    long: bool,
) -> (Decimal, Decimal, Decimal) {
    let price_change_pct = if long {
        (exit_price - entry_price) / entry_price
    } else {
        (entry_price - exit_price) / entry_price
    };
    let gross_pnl = position_size * price_change_pct * Decimal::from(leverage);
    let entry_fee = position_size * Decimal::from(leverage) * taker_fee;
    let total_fee = entry_fee * dec!(2);
    (gross_pnl, total_fee, gross_pnl - total_fee)
}

/// Replay candles after `entry_idx` against a fired signal's stop/take
/// levels. Returns `None` if neither level is touched before the data runs
/// out (an open-ended trade the backtest does not count).
pub fn simulate_trade(
    candles: &[Candle],
    entry_idx: usize,
    position_type: PositionType,
    signal: &DirectionalSignal,
    config: &TradingConfig,
) -> Option<BacktestTrade> {
    let long = position_type == PositionType::Long;
    for (offset, candle) in candles.iter().enumerate().skip(entry_idx + 1) {
        let hit_stop = if long {
            candle.low <= signal.stop_loss
        } else {
            candle.high >= signal.stop_loss
        };
        if hit_stop {
            let (gross_pnl, fees, net_pnl) = settle(
                signal.entry_price,
                signal.stop_loss,
                config.position_size,
                config.leverage,
                config.taker_fee,
                long,
            );
            return Some(BacktestTrade {
                position_type,
                strategy: signal.strategy,
                confidence: signal.confidence,
                entry_time: signal.timestamp,
                exit_time: candle.open_time,
                entry_price: signal.entry_price,
                exit_price: signal.stop_loss,
                gross_pnl,
                fees,
                net_pnl,
                result: TradeResult::Loss,
                bars_held: offset - entry_idx,
            });
        }

        let hit_take = if long {
            candle.high >= signal.take_profit
        } else {
            candle.low <= signal.take_profit
        };
        if hit_take {
            let (gross_pnl, fees, net_pnl) = settle(
                signal.entry_price,
                signal.take_profit,
                config.position_size,
                config.leverage,
                config.taker_fee,
                long,
            );
            return Some(BacktestTrade {
                position_type,
                strategy: signal.strategy,
                confidence: signal.confidence,
                entry_time: signal.timestamp,
                exit_time: candle.open_time,
                entry_price: signal.entry_price,
                exit_price: signal.take_profit,
                gross_pnl,
                fees,
                net_pnl,
                result: TradeResult::Win,
                bars_held: offset - entry_idx,
            });
        }
    }
    None
}

/// Fold a timeframe's trades into the aggregate stored in a `ScanRecord`.
/// `best_strategy` is the mode of the trades' `StrategyKind::classify()`
/// tags (spec.md §9's resolved tie-break: ties favor priority order
/// A > B > C > D, i.e. advanced over basic).
pub fn aggregate(trades: &[BacktestTrade], analysis_time: DateTime<Utc>) -> TimeframeResult {
    if trades.is_empty() {
        return TimeframeResult {
            total_trades: 0,
            win_rate: Decimal::ZERO,
            total_pnl: Decimal::ZERO,
            avg_win: Decimal::ZERO,
            avg_loss: Decimal::ZERO,
            confidence_avg: Decimal::ZERO,
            best_strategy: BestStrategy::None,
            analysis_time,
            status: TimeframeStatus::NoTrades,
        };
    }

    let total_trades = trades.len() as u32;
    let wins: Vec<&BacktestTrade> = trades.iter().filter(|t| t.result == TradeResult::Win).collect();
    let losses: Vec<&BacktestTrade> = trades.iter().filter(|t| t.result == TradeResult::Loss).collect();

    let win_rate = Decimal::from(wins.len() as u32) / Decimal::from(total_trades) * dec!(100);
    let total_pnl: Decimal = trades.iter().map(|t| t.net_pnl).sum();
    let avg_win = if wins.is_empty() {
        Decimal::ZERO
    } else {
        wins.iter().map(|t| t.net_pnl).sum::<Decimal>() / Decimal::from(wins.len() as u32)
    };
    let avg_loss = if losses.is_empty() {
        Decimal::ZERO
    } else {
        losses.iter().map(|t| t.net_pnl).sum::<Decimal>() / Decimal::from(losses.len() as u32)
    };
    let confidence_avg = trades.iter().map(|t| t.confidence).sum::<Decimal>() / Decimal::from(total_trades);

    let mut counts: HashMap<StrategyKind, u32> = HashMap::new();
    for trade in trades {
        *counts.entry(trade.strategy).or_insert(0) += 1;
    }
    let priority = [
        StrategyKind::DowntrendShort,
        StrategyKind::UptrendLong,
        StrategyKind::SupportBounceLong,
        StrategyKind::BasicLong,
        StrategyKind::BasicShort,
    ];
    let max_count = counts.values().copied().max().unwrap_or(0);
    let best_kind = priority
        .into_iter()
        .find(|kind| counts.get(kind).copied().unwrap_or(0) == max_count)
        .unwrap_or(StrategyKind::BasicLong);

    TimeframeResult {
        total_trades,
        win_rate,
        total_pnl,
        avg_win,
        avg_loss,
        confidence_avg,
        best_strategy: best_kind.classify(),
        analysis_time,
        status: TimeframeStatus::Completed,
    }
}
