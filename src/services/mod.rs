//! The five long-running pipeline services plus the implied Scanner
//! (spec.md §2, §4): each module exposes one `run_once`/`process_task`
//! entry point; the corresponding `src/bin/*.rs` wraps it in a periodic
//! loop or broker-consume loop with signal handling.

pub mod analyzer;
pub mod discovery;
pub mod executor;
pub mod finder;
pub mod scanner;
pub mod selector;

use crate::error::Result;
use crate::exchange::ExchangeClient;
use crate::types::fibonacci::default_lookback_days;
use crate::types::{MultiTimeframeFibonacci, Timeframe};

/// Timeframes the Scanner fans a symbol out to for backtesting (spec.md
/// §6.2's `backtest-tasks` message contract).
pub const BACKTEST_TIMEFRAMES: [u32; 5] = [1, 3, 5, 15, 30];

/// The five timeframes spec.md §3's multi-timeframe fibonacci table covers,
/// each with its own lookback window: 5m:1d, 15m:2d, 30m:5d, 240m:7d, D:30d.
const MTF_FIBONACCI_TIMEFRAMES: [Timeframe; 5] = [
    Timeframe::Minutes(5),
    Timeframe::Minutes(15),
    Timeframe::Minutes(30),
    Timeframe::Minutes(240),
    Timeframe::Day,
];

fn bars_for_lookback(tf: Timeframe, days: u32) -> u32 {
    let minutes_per_bar = match tf {
        Timeframe::Minutes(m) => m,
        Timeframe::Day => 24 * 60,
    };
    (days * 24 * 60) / minutes_per_bar.max(1)
}

/// Fetch each of spec.md §3's five configured timeframes for `symbol`, over
/// that timeframe's own lookback window, and build the resulting
/// `MultiTimeframeFibonacci` (precomputed once per analyzer/finder
/// invocation, not recomputed per-bar: spec.md §4.3/§4.5's "precompute ...
/// MTF fibonacci ... once"). A timeframe whose fetch fails or returns no
/// candles is simply missing from `by_timeframe` rather than failing the
/// whole call — strategies still run against whichever timeframes came
/// back.
pub async fn load_mtf_fibonacci(symbol: &str, exchange: &dyn ExchangeClient) -> Result<MultiTimeframeFibonacci> {
    let mut mtf = MultiTimeframeFibonacci::default();
    for tf in MTF_FIBONACCI_TIMEFRAMES {
        let limit = bars_for_lookback(tf, default_lookback_days(tf));
        if let Ok(candles) = exchange.get_klines(symbol, tf, limit).await {
            if let Some(fib) = crate::types::FibonacciLevels::from_candles(&candles) {
                mtf.by_timeframe.insert(tf.label(), fib);
            }
        }
    }
    Ok(mtf)
}
