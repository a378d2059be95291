//! Position-Finder (spec.md §4.5): consumes one `trading-signals` message
//! at a time, re-evaluates the entry engine on the most recent candle
//! only, and writes a concrete `PositionProposal` if nothing on the
//! exchange or in the Positions table already covers the symbol.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::info;
use uuid::Uuid;

use crate::broker::TradingSignalTask;
use crate::config::TradingConfig;
use crate::entry_engine;
use crate::error::Result;
use crate::exchange::ExchangeClient;
use crate::persistence::PositionsStore;
use crate::trend;
use crate::types::signal::{DirectionalSignal, FundingInfo};
use crate::types::{FibonacciLevels, PositionProposal, PositionStatus, PositionType, Timeframe};

const HISTORY_LIMIT: u32 = 1000;
const SIMILARITY_ENTRY_TOLERANCE: Decimal = dec!(0.005);
const SIMILARITY_CONFIDENCE_TOLERANCE: Decimal = dec!(5);
const DEDUPE_WINDOW_SECS: i64 = 300;

/// Recent-history depth per spec.md §4.5's lookback table.
fn lookback_limit(timeframe: Timeframe) -> u32 {
    let minutes = match timeframe {
        Timeframe::Minutes(m) => m,
        Timeframe::Day => 1440,
    };
    let days = if minutes <= 5 {
        4
    } else if minutes <= 15 {
        11
    } else if minutes <= 60 {
        21
    } else {
        42
    };
    let bars_per_day = (24 * 60) / minutes.max(1);
    (days * bars_per_day).min(HISTORY_LIMIT)
}

fn similar(existing: &PositionProposal, proposal: &PositionProposal) -> bool {
    if existing.position_type != proposal.position_type {
        return false;
    }
    let entry_delta = (existing.entry_price - proposal.entry_price).abs() / existing.entry_price;
    if entry_delta >= SIMILARITY_ENTRY_TOLERANCE {
        return false;
    }
    (existing.confidence - proposal.confidence).abs() <= SIMILARITY_CONFIDENCE_TOLERANCE
}

/// Process one trading-signal task. Returns `Ok(())` whether or not a
/// proposal was written (a dropped/no-signal outcome is not an error and
/// the caller should still ack).
pub async fn process_task(
    task: &TradingSignalTask,
    exchange: &dyn ExchangeClient,
    positions: &dyn PositionsStore,
    config: &TradingConfig,
) -> Result<()> {
    let Some(timeframe) = Timeframe::parse(&task.timeframe) else {
        return Ok(());
    };

    let limit = lookback_limit(timeframe);
    let candles = exchange.get_klines(&task.symbol, timeframe, limit).await?;
    let btc_candles = exchange.get_klines("BTCUSDT", timeframe, limit).await?;
    let rules = exchange.get_instrument_rules(&task.symbol).await?;

    let mtf_fibonacci = crate::services::load_mtf_fibonacci(&task.symbol, exchange).await?;
    let fib_levels: HashMap<String, Decimal> = if mtf_fibonacci.is_empty() {
        FibonacciLevels::from_candles(&candles).map(|fib| fib.levels).unwrap_or_default()
    } else {
        mtf_fibonacci.union_levels()
    };
    let btc_trend = trend::btc_trend(&btc_candles, 60);
    let coin_trend = trend::coin_trend(&candles, 30);
    let funding = exchange
        .get_funding_rate(&task.symbol)
        .await
        .map(FundingInfo::from_rate)
        .unwrap_or_else(|_| FundingInfo::neutral());

    let signal = entry_engine::evaluate(&candles, &rules, &fib_levels, &btc_trend, &coin_trend, &funding, config);
    let (position_type, directional): (PositionType, &DirectionalSignal) = match &signal {
        crate::types::Signal::None => return Ok(()),
        crate::types::Signal::Long(s) => (PositionType::Long, s),
        crate::types::Signal::Short(s) => (PositionType::Short, s),
    };

    if exchange.get_open_positions().await?.iter().any(|s| s == &task.symbol) {
        info!(symbol = %task.symbol, "finder dropping: open exchange position already exists");
        return Ok(());
    }
    if exchange.has_open_order(&task.symbol).await? {
        info!(symbol = %task.symbol, "finder dropping: open exchange order already exists");
        return Ok(());
    }

    let (nearest_support, nearest_resistance) = entry_engine::nearest_fib_prices(directional.entry_price, &fib_levels);

    let proposal = PositionProposal::from_signal(
        task.symbol.clone(),
        position_type,
        directional,
        task.timeframe.clone(),
        config.position_size,
        config.leverage,
        btc_trend,
        coin_trend,
        funding,
        nearest_support,
        nearest_resistance,
        Uuid::new_v4().to_string(),
        task.scan_id.clone(),
    );

    if let Some(existing) = recent_proposal(positions, &task.symbol, proposal.signal_timestamp).await? {
        match existing.status {
            PositionStatus::Executing => {
                info!(symbol = %task.symbol, "finder dropping: proposal already executing");
                return Ok(());
            }
            PositionStatus::Active if similar(&existing, &proposal) => {
                info!(symbol = %task.symbol, "finder dropping: similar proposal already active");
                return Ok(());
            }
            PositionStatus::Active => {
                match positions
                    .update_status(
                        &existing.symbol,
                        existing.signal_timestamp,
                        PositionStatus::Active,
                        PositionStatus::Expired,
                    )
                    .await
                {
                    Ok(()) => {}
                    Err(crate::error::PipelineError::PersistenceConflict(_)) => {
                        info!(symbol = %task.symbol, "finder dropping: existing proposal already transitioned by another process");
                        return Ok(());
                    }
                    Err(err) => return Err(err),
                }
            }
            _ => {}
        }
    }

    positions.put(proposal).await
}

async fn recent_proposal(positions: &dyn PositionsStore, symbol: &str, around: DateTime<Utc>) -> Result<Option<PositionProposal>> {
    let cutoff = around - ChronoDuration::seconds(DEDUPE_WINDOW_SECS);
    Ok(positions
        .latest_for_symbol(symbol)
        .await?
        .filter(|p| p.signal_timestamp >= cutoff))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as PipelineResult;
    use crate::exchange::{OrderAck, OrderRequest};
    use crate::persistence::memory::InMemoryPositionsStore;
    use crate::types::{Candle, InstrumentRules, SymbolInfo};
    use async_trait::async_trait;
    use chrono::DateTime as ChronoDateTime;

    struct ScriptedExchange {
        candles: Vec<Candle>,
        open_positions: Vec<String>,
        open_order: bool,
    }

    #[async_trait]
    impl ExchangeClient for ScriptedExchange {
        async fn get_klines(&self, _symbol: &str, _timeframe: Timeframe, _limit: u32) -> PipelineResult<Vec<Candle>> {
            Ok(self.candles.clone())
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
            Ok(self.open_positions.clone())
        }
        async fn get_wallet_balance(&self) -> PipelineResult<Decimal> {
            Ok(Decimal::ZERO)
        }
        async fn has_open_order(&self, _symbol: &str) -> PipelineResult<bool> {
            Ok(self.open_order)
        }
    }

    fn flat_candle(i: i64) -> Candle {
        Candle {
            open_time: ChronoDateTime::from_timestamp(i * 60, 0).unwrap(),
            open: dec!(100),
            high: dec!(100.1),
            low: dec!(99.9),
            close: dec!(100),
            volume: dec!(1000),
            turnover: dec!(100_000),
        }
    }

    fn task() -> TradingSignalTask {
        TradingSignalTask {
            selector_id: "sel-1".into(),
            symbol: "FLATUSDT".into(),
            timeframe: "5".into(),
            strategy: "Basic".into(),
            win_rate: dec!(50),
            total_pnl: dec!(150),
            confidence_avg: dec!(70),
            scan_id: "scan-1".into(),
            volatility_24h: dec!(3),
            price: dec!(100),
            timestamp: Utc::now().timestamp(),
        }
    }

    #[tokio::test]
    async fn flat_market_drops_with_no_error() {
        let exchange = ScriptedExchange {
            candles: (0..40).map(flat_candle).collect(),
            open_positions: vec![],
            open_order: false,
        };
        let positions = InMemoryPositionsStore::default();
        let config = TradingConfig::default();

        process_task(&task(), &exchange, &positions, &config).await.unwrap();
        assert!(positions.active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn existing_exchange_position_blocks_a_new_proposal() {
        let exchange = ScriptedExchange {
            candles: (0..40).map(flat_candle).collect(),
            open_positions: vec!["FLATUSDT".to_string()],
            open_order: false,
        };
        let positions = InMemoryPositionsStore::default();
        let config = TradingConfig::default();

        process_task(&task(), &exchange, &positions, &config).await.unwrap();
        assert!(positions.active().await.unwrap().is_empty());
    }

    #[test]
    fn lookback_limit_matches_the_configured_bands() {
        assert_eq!(lookback_limit(Timeframe::Minutes(5)), HISTORY_LIMIT);
        assert_eq!(lookback_limit(Timeframe::Minutes(60)), 21 * 24);
    }

    fn base_proposal(entry_price: Decimal, confidence: Decimal) -> PositionProposal {
        let signal = DirectionalSignal {
            strategy: crate::types::signal::StrategyKind::BasicLong,
            confidence,
            entry_price,
            stop_loss: entry_price * dec!(0.99),
            take_profit: entry_price * dec!(1.02),
            expected_profit: dec!(20),
            expected_loss: dec!(10),
            fees: dec!(1.2),
            net_profit: dec!(18.8),
            rsi: dec!(32),
            bb_position: dec!(0.1),
            bb_width: dec!(2),
            timestamp: Utc::now(),
        };
        PositionProposal::from_signal(
            "FLATUSDT".into(),
            PositionType::Long,
            &signal,
            "3".into(),
            dec!(100),
            10,
            crate::types::signal::TrendSnapshot::unknown(),
            crate::types::signal::TrendSnapshot::unknown(),
            FundingInfo::neutral(),
            None,
            None,
            "sig-1".into(),
            "scan-1".into(),
        )
    }

    #[test]
    fn similar_proposals_within_tolerance_are_deduped() {
        let existing = base_proposal(dec!(100), dec!(65));
        let close_dupe = base_proposal(dec!(100.3), dec!(68));
        assert!(similar(&existing, &close_dupe));

        let far_apart = base_proposal(dec!(102), dec!(65));
        assert!(!similar(&existing, &far_apart));

        let low_confidence = base_proposal(dec!(100.1), dec!(40));
        assert!(!similar(&existing, &low_confidence));
    }

    #[tokio::test]
    async fn recent_proposal_respects_dedupe_window() {
        let positions = InMemoryPositionsStore::default();
        let existing = base_proposal(dec!(100), dec!(65));
        let signal_time = existing.signal_timestamp;
        positions.put(existing).await.unwrap();

        let within_window = recent_proposal(&positions, "FLATUSDT", signal_time + ChronoDuration::seconds(60))
            .await
            .unwrap();
        assert!(within_window.is_some());

        let outside_window = recent_proposal(&positions, "FLATUSDT", signal_time + ChronoDuration::seconds(600))
            .await
            .unwrap();
        assert!(outside_window.is_none());
    }
}
