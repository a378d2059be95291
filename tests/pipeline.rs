//! End-to-end plumbing tests across service boundaries: real in-memory
//! broker/KV/persistence wiring exercised the way the production binaries
//! compose them, rather than a single service's unit tests in isolation.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use omni::broker::memory::InMemoryBroker;
use omni::broker::{publish_trading_signal, Broker, TradingSignalTask};
use omni::config::TradingConfig;
use omni::error::Result as PipelineResult;
use omni::exchange::{ExchangeClient, OrderAck, OrderRequest};
use omni::kv::memory::InMemoryKv;
use omni::persistence::memory::{InMemoryPositionsStore, InMemoryResultsStore, InMemoryScanHistoryStore};
use omni::persistence::{PositionsStore, ResultsStore, ScanHistoryStore};
use omni::services::selector::TRADING_SIGNALS_QUEUE;
use omni::services::{analyzer, discovery, executor, scanner, selector};
use omni::types::signal::{BestStrategy, DirectionalSignal, FundingInfo, StrategyKind, TrendSnapshot};
use omni::types::scan::TimeframeStatus;
use omni::types::{Candle, InstrumentRules, PositionProposal, PositionStatus, PositionType, SymbolInfo, Timeframe};

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

fn flat_candle(i: i64, close: Decimal) -> Candle {
    Candle {
        open_time: chrono::DateTime::from_timestamp(i * 60, 0).unwrap(),
        open: close,
        high: close * dec!(1.001),
        low: close * dec!(0.999),
        close,
        volume: dec!(1000),
        turnover: dec!(1000) * close,
    }
}

fn ticker(symbol: &str, last: Decimal, turnover: Decimal, change_pct: Decimal) -> SymbolInfo {
    SymbolInfo {
        symbol: symbol.to_string(),
        last_price: last,
        bid_price: last,
        ask_price: last,
        turnover_24h: turnover,
        volume_24h: dec!(5000),
        price_change_pct_24h: change_pct,
        high_24h: last,
        low_24h: last,
        funding_rate: Decimal::ZERO,
        rules: rules(),
    }
}

struct FlatMarketExchange {
    tickers: Vec<SymbolInfo>,
    open_positions: Vec<String>,
}

#[async_trait]
impl ExchangeClient for FlatMarketExchange {
    async fn get_klines(&self, _symbol: &str, _timeframe: Timeframe, _limit: u32) -> PipelineResult<Vec<Candle>> {
        Ok((0..40).map(|i| flat_candle(i, dec!(100))).collect())
    }
    async fn get_tickers(&self) -> PipelineResult<Vec<SymbolInfo>> {
        Ok(self.tickers.clone())
    }
    async fn get_ticker(&self, symbol: &str) -> PipelineResult<Option<SymbolInfo>> {
        Ok(self.tickers.iter().find(|t| t.symbol == symbol).cloned())
    }
    async fn get_instrument_rules(&self, _symbol: &str) -> PipelineResult<InstrumentRules> {
        Ok(rules())
    }
    async fn get_funding_rate(&self, _symbol: &str) -> PipelineResult<Decimal> {
        Ok(Decimal::ZERO)
    }
    async fn set_leverage(&self, _symbol: &str, _leverage: u32) -> PipelineResult<()> {
        Ok(())
    }
    async fn place_order(&self, request: OrderRequest) -> PipelineResult<OrderAck> {
        Ok(OrderAck {
            order_id: "ord-1".into(),
            symbol: request.symbol,
            side: request.side,
            qty: request.qty,
        })
    }
    async fn get_open_positions(&self) -> PipelineResult<Vec<String>> {
        Ok(self.open_positions.clone())
    }
    async fn get_wallet_balance(&self) -> PipelineResult<Decimal> {
        Ok(dec!(1000))
    }
    async fn has_open_order(&self, _symbol: &str) -> PipelineResult<bool> {
        Ok(false)
    }
}

/// Full chain on a flat market: discovery ranks the symbol, scanner fans it
/// out to `backtest-tasks`, the analyzer finds no trades, and the selector
/// correctly withholds a trading signal because nothing cleared the
/// win-rate/PnL/trade-count gates.
#[tokio::test]
async fn flat_market_never_reaches_a_trading_signal() {
    let exchange = FlatMarketExchange {
        tickers: vec![ticker("FLATUSDT", dec!(100), dec!(5_000_000), dec!(3))],
        open_positions: vec![],
    };
    let kv = InMemoryKv::default();
    let broker = InMemoryBroker::default();
    let results = InMemoryResultsStore::default();
    let scan_history = InMemoryScanHistoryStore::default();
    let config = TradingConfig::default();

    discovery::run_once(&exchange, &kv, &config).await.unwrap();
    let published = scanner::run_once("scanner-1", &kv, &results, &scan_history, &broker).await.unwrap();
    assert_eq!(published, omni::services::BACKTEST_TIMEFRAMES.len());

    while let Some(delivery) = broker.consume_one(scanner::BACKTEST_QUEUE).await.unwrap() {
        let task: omni::broker::BacktestTask = serde_json::from_slice(delivery.body()).unwrap();
        analyzer::process_task(&task, &exchange, &results, &config).await.unwrap();
        delivery.ack().await.unwrap();
    }

    let record = results.latest_for_symbol("FLATUSDT").await.unwrap().unwrap();
    for result in record.timeframes.values() {
        assert_eq!(result.status, TimeframeStatus::NoTrades);
    }

    let emitted = selector::run_once("sel-1", &results, &broker, &config).await.unwrap();
    assert_eq!(emitted, 0);
    assert!(broker.consume_one(TRADING_SIGNALS_QUEUE).await.unwrap().is_none());
}

/// Invariant I6 across two discovery cycles: a symbol dropped from the
/// selected set has its Results row deleted the next time the scanner runs,
/// not merely when seeded directly (as the scanner's own unit tests do).
#[tokio::test]
async fn symbol_dropped_from_discovery_is_gced_on_the_next_scan() {
    let kv = InMemoryKv::default();
    let broker = InMemoryBroker::default();
    let results = InMemoryResultsStore::default();
    let scan_history = InMemoryScanHistoryStore::default();
    let config = TradingConfig::default();

    let exchange_with_both = FlatMarketExchange {
        tickers: vec![
            ticker("AAAUSDT", dec!(100), dec!(5_000_000), dec!(3)),
            ticker("BBBUSDT", dec!(50), dec!(6_000_000), dec!(4)),
        ],
        open_positions: vec![],
    };
    discovery::run_once(&exchange_with_both, &kv, &config).await.unwrap();
    scanner::run_once("scanner-1", &kv, &results, &scan_history, &broker).await.unwrap();
    results
        .put(omni::types::ScanRecord::new("AAAUSDT".into(), 0, dec!(100), dec!(5_000_000), dec!(3)))
        .await
        .unwrap();
    results
        .put(omni::types::ScanRecord::new("BBBUSDT".into(), 0, dec!(50), dec!(6_000_000), dec!(4)))
        .await
        .unwrap();

    let exchange_with_one = FlatMarketExchange {
        tickers: vec![ticker("BBBUSDT", dec!(50), dec!(6_000_000), dec!(4))],
        open_positions: vec![],
    };
    discovery::run_once(&exchange_with_one, &kv, &config).await.unwrap();
    scanner::run_once("scanner-1", &kv, &results, &scan_history, &broker).await.unwrap();

    assert!(results.latest_for_symbol("AAAUSDT").await.unwrap().is_none());
    assert!(results.latest_for_symbol("BBBUSDT").await.unwrap().is_some());
}

/// The selector's message survives a real broker round-trip and the
/// Position-Finder consumes it safely even when the entry engine no longer
/// fires against the latest candle (market went flat between selection and
/// consumption).
#[tokio::test]
async fn trading_signal_round_trips_through_the_broker_to_the_finder() {
    let mut record = omni::types::ScanRecord::new(
        "FLATUSDT".into(),
        chrono::Utc::now().timestamp(),
        dec!(100),
        dec!(5_000_000),
        dec!(3),
    );
    record.upsert_timeframe(
        "5".into(),
        omni::types::TimeframeResult {
            total_trades: 25,
            win_rate: dec!(50),
            total_pnl: dec!(150),
            avg_win: dec!(10),
            avg_loss: dec!(-5),
            confidence_avg: dec!(75),
            best_strategy: BestStrategy::Advanced,
            analysis_time: chrono::Utc::now(),
            status: TimeframeStatus::Completed,
        },
    );
    let results = InMemoryResultsStore::default();
    results.put(record).await.unwrap();
    let broker = InMemoryBroker::default();
    let config = TradingConfig::default();

    let emitted = selector::run_once("sel-1", &results, &broker, &config).await.unwrap();
    assert_eq!(emitted, 1);

    let delivery = broker.consume_one(TRADING_SIGNALS_QUEUE).await.unwrap().unwrap();
    let task: TradingSignalTask = serde_json::from_slice(delivery.body()).unwrap();
    assert_eq!(task.symbol, "FLATUSDT");

    let exchange = FlatMarketExchange {
        tickers: vec![],
        open_positions: vec![],
    };
    let positions = InMemoryPositionsStore::default();
    omni::services::finder::process_task(&task, &exchange, &positions, &config).await.unwrap();
    delivery.ack().await.unwrap();

    assert!(positions.active().await.unwrap().is_empty());
}

/// Scenario S6: the Executor independently rediscovers an exchange-side
/// conflict and refuses to place an order even though the proposal itself
/// is otherwise fully eligible.
#[tokio::test]
async fn executor_refuses_to_double_book_an_existing_exchange_position() {
    let signal = DirectionalSignal {
        strategy: StrategyKind::BasicLong,
        confidence: dec!(65),
        entry_price: dec!(100),
        stop_loss: dec!(99),
        take_profit: dec!(102),
        expected_profit: dec!(20),
        expected_loss: dec!(10),
        fees: dec!(1.2),
        net_profit: dec!(18.8),
        rsi: dec!(32),
        bb_position: dec!(0.1),
        bb_width: dec!(2),
        timestamp: chrono::Utc::now(),
    };
    let proposal = PositionProposal::from_signal(
        "SYMXUSDT".into(),
        PositionType::Long,
        &signal,
        "3".into(),
        dec!(100),
        10,
        TrendSnapshot::unknown(),
        TrendSnapshot::unknown(),
        FundingInfo::neutral(),
        None,
        None,
        "sig-1".into(),
        "scan-1".into(),
    );
    let positions = InMemoryPositionsStore::default();
    positions.put(proposal).await.unwrap();

    let exchange = FlatMarketExchange {
        tickers: vec![ticker("SYMXUSDT", dec!(100), dec!(5_000_000), dec!(3))],
        open_positions: vec!["SYMXUSDT".to_string()],
    };
    let config = TradingConfig::default();

    executor::run_once(&exchange, &positions, &config).await.unwrap();

    let row = positions.latest_for_symbol("SYMXUSDT").await.unwrap().unwrap();
    assert_eq!(row.status, PositionStatus::Active);
}

/// A second, independently-published signal for a symbol the Selector
/// already promoted is still safely consumable: this exercises the
/// publish helper directly rather than `run_once`'s own record iteration.
#[tokio::test]
async fn publish_trading_signal_helper_roundtrips_through_the_broker() {
    let broker = InMemoryBroker::default();
    let task = TradingSignalTask {
        selector_id: "sel-1".into(),
        symbol: "DUPEUSDT".into(),
        timeframe: "5".into(),
        strategy: "Advanced".into(),
        win_rate: dec!(55),
        total_pnl: dec!(200),
        confidence_avg: dec!(80),
        scan_id: "scan-9".into(),
        volatility_24h: dec!(4),
        price: dec!(10),
        timestamp: chrono::Utc::now().timestamp(),
    };
    publish_trading_signal(&broker, TRADING_SIGNALS_QUEUE, &task).await.unwrap();
    publish_trading_signal(&broker, TRADING_SIGNALS_QUEUE, &task).await.unwrap();

    let first = broker.consume_one(TRADING_SIGNALS_QUEUE).await.unwrap().unwrap();
    let second = broker.consume_one(TRADING_SIGNALS_QUEUE).await.unwrap().unwrap();
    let third = broker.consume_one(TRADING_SIGNALS_QUEUE).await.unwrap();
    assert!(third.is_none());

    let first_task: TradingSignalTask = serde_json::from_slice(first.body()).unwrap();
    let second_task: TradingSignalTask = serde_json::from_slice(second.body()).unwrap();
    assert_eq!(first_task.symbol, second_task.symbol);
}
