//! Backtest-Analyzer (spec.md §4.3): consumes one `backtest-tasks` message
//! at a time, replays the entry engine bar-by-bar over historical candles,
//! simulates every fired signal to its exit, and upserts the aggregate
//! into the Results table.

use std::collections::HashMap;

use chrono::Utc;
use tracing::warn;

use crate::broker::BacktestTask;
use crate::config::TradingConfig;
use crate::entry_engine;
use crate::error::Result;
use crate::exchange::ExchangeClient;
use crate::persistence::ResultsStore;
use crate::simulate;
use crate::trend;
use crate::types::scan::TimeframeStatus;
use crate::types::signal::{BestStrategy, FundingInfo};
use crate::types::{FibonacciLevels, PositionType, ScanRecord, Timeframe};

const HISTORY_LIMIT: u32 = 1000;
/// A record is considered the "current cycle" for upsert purposes if its
/// scan_timestamp is within this many seconds of the task being processed
/// (spec.md §4.3: "scan_timestamp within the last hour").
const UPSERT_WINDOW_SECS: i64 = 3600;

/// Process one backtest task end to end. Never returns an error for a bad
/// symbol: candle-load failures are recorded as a `failed` TimeframeResult
/// (spec.md §7) so a single bad symbol cannot block the consumer loop.
pub async fn process_task(task: &BacktestTask, exchange: &dyn ExchangeClient, results: &dyn ResultsStore, config: &TradingConfig) -> Result<()> {
    let Some(timeframe) = Timeframe::parse(&task.timeframe) else {
        warn!(timeframe = %task.timeframe, "malformed timeframe in backtest task, dropping");
        return Ok(());
    };

    let outcome = run_analysis(task, timeframe, exchange, config).await;

    let mut record = match results.latest_for_symbol(&task.symbol).await? {
        Some(existing) if (task.timestamp - existing.scan_timestamp).abs() <= UPSERT_WINDOW_SECS => existing,
        _ => ScanRecord::new(task.symbol.clone(), task.timestamp, task.price, task.turnover, task.price_change_24h),
    };

    match outcome {
        Ok(result) => record.upsert_timeframe(task.timeframe.clone(), result),
        Err(err) => {
            warn!(symbol = %task.symbol, timeframe = %task.timeframe, error = %err, "analysis failed");
            record.upsert_timeframe(
                task.timeframe.clone(),
                crate::types::TimeframeResult {
                    total_trades: 0,
                    win_rate: Default::default(),
                    total_pnl: Default::default(),
                    avg_win: Default::default(),
                    avg_loss: Default::default(),
                    confidence_avg: Default::default(),
                    best_strategy: BestStrategy::Error,
                    analysis_time: Utc::now(),
                    status: TimeframeStatus::Failed,
                },
            );
        }
    }

    results.put(record).await
}

/// Walk one (symbol, timeframe) candle window bar-by-bar and aggregate
/// every fired signal's simulated outcome. Exposed for the ad-hoc
/// `backtest` CLI as well as the queue-driven `process_task` above.
pub async fn run_analysis(
    task: &BacktestTask,
    timeframe: Timeframe,
    exchange: &dyn ExchangeClient,
    config: &TradingConfig,
) -> Result<crate::types::TimeframeResult> {
    let candles = exchange.get_klines(&task.symbol, timeframe, HISTORY_LIMIT).await?;
    let btc_candles = exchange.get_klines("BTCUSDT", timeframe, HISTORY_LIMIT).await?;
    let rules = exchange.get_instrument_rules(&task.symbol).await?;

    let min_len = config.bb_period + 10;
    if candles.len() < min_len {
        return Ok(simulate::aggregate(&[], Utc::now()));
    }

    let mtf_fibonacci = crate::services::load_mtf_fibonacci(&task.symbol, exchange).await?;
    let fib_union: HashMap<_, _> = if mtf_fibonacci.is_empty() {
        FibonacciLevels::from_candles(&candles).map(|fib| fib.levels).unwrap_or_default()
    } else {
        mtf_fibonacci.union_levels()
    };
    let btc_trend = trend::btc_trend(&btc_candles, 60);
    let funding = exchange
        .get_funding_rate(&task.symbol)
        .await
        .map(FundingInfo::from_rate)
        .unwrap_or_else(|_| FundingInfo::neutral());

    let mut trades = Vec::new();
    for end in min_len..candles.len() {
        let window = &candles[..=end];
        let coin_trend = trend::coin_trend(window, 30);
        let signal = entry_engine::evaluate(window, &rules, &fib_union, &btc_trend, &coin_trend, &funding, config);

        let (position_type, directional) = match &signal {
            crate::types::Signal::None => continue,
            crate::types::Signal::Long(s) => (PositionType::Long, s),
            crate::types::Signal::Short(s) => (PositionType::Short, s),
        };

        if let Some(trade) = simulate::simulate_trade(&candles, end, position_type, directional, config) {
            trades.push(trade);
        }
    }

    Ok(simulate::aggregate(&trades, Utc::now()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as PipelineResult;
    use crate::exchange::{OrderAck, OrderRequest};
    use crate::persistence::memory::InMemoryResultsStore;
    use crate::types::{Candle, InstrumentRules, SymbolInfo};
    use async_trait::async_trait;
    use chrono::DateTime;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct FlatExchange;

    fn candle(i: i64, close: Decimal) -> Candle {
        Candle {
            open_time: DateTime::from_timestamp(i * 60, 0).unwrap(),
            open: close,
            high: close * dec!(1.001),
            low: close * dec!(0.999),
            close,
            volume: dec!(1000),
            turnover: dec!(1000) * close,
        }
    }

    #[async_trait]
    impl ExchangeClient for FlatExchange {
        async fn get_klines(&self, _symbol: &str, _timeframe: Timeframe, _limit: u32) -> PipelineResult<Vec<Candle>> {
            Ok((0..40).map(|i| candle(i, dec!(100))).collect())
        }
        async fn get_tickers(&self) -> PipelineResult<Vec<SymbolInfo>> {
            Ok(vec![])
        }
        async fn get_ticker(&self, _symbol: &str) -> PipelineResult<Option<SymbolInfo>> {
            Ok(None)
        }
        async fn get_instrument_rules(&self, _symbol: &str) -> PipelineResult<InstrumentRules> {
            Ok(InstrumentRules {
                price_tick: dec!(0.01),
                min_price: dec!(0.01),
                qty_step: dec!(0.001),
                min_qty: dec!(0.001),
                max_qty: dec!(1000),
                price_decimals: 2,
                qty_decimals: 3,
            })
        }
        async fn get_funding_rate(&self, _symbol: &str) -> PipelineResult<Decimal> {
            Ok(Decimal::ZERO)
        }
        async fn set_leverage(&self, _symbol: &str, _leverage: u32) -> PipelineResult<()> {
            Ok(())
        }
        async fn place_order(&self, _request: OrderRequest) -> PipelineResult<OrderAck> {
            unimplemented!()
        }
        async fn get_open_positions(&self) -> PipelineResult<Vec<String>> {
            Ok(vec![])
        }
        async fn get_wallet_balance(&self) -> PipelineResult<Decimal> {
            Ok(Decimal::ZERO)
        }
        async fn has_open_order(&self, _symbol: &str) -> PipelineResult<bool> {
            Ok(false)
        }
    }

    fn task() -> BacktestTask {
        BacktestTask {
            scan_id: "scan-1".into(),
            symbol: "FLATUSDT".into(),
            timeframe: "5".into(),
            volatility_24h: dec!(3),
            turnover: dec!(5_000_000),
            price: dec!(100),
            price_change_24h: dec!(3),
            timestamp: Utc::now().timestamp(),
        }
    }

    #[tokio::test]
    async fn flat_market_yields_no_trades_but_still_upserts() {
        let exchange = FlatExchange;
        let results = InMemoryResultsStore::default();
        let config = TradingConfig::default();

        process_task(&task(), &exchange, &results, &config).await.unwrap();

        let record = results.latest_for_symbol("FLATUSDT").await.unwrap().unwrap();
        let tf_result = record.timeframes.get("5").unwrap();
        assert_eq!(tf_result.total_trades, 0);
    }

    #[tokio::test]
    async fn unknown_timeframe_is_dropped_without_error() {
        let exchange = FlatExchange;
        let results = InMemoryResultsStore::default();
        let config = TradingConfig::default();
        let mut bad_task = task();
        bad_task.timeframe = "not-a-number".into();

        process_task(&bad_task, &exchange, &results, &config).await.unwrap();
        assert!(results.latest_for_symbol("FLATUSDT").await.unwrap().is_none());
    }
}
