//! Message broker abstraction for the pipeline's two named queues
//! (spec.md §6.2): `backtest-tasks` (Discovery -> Scanner/Backtest-Analyzer)
//! and `trading-signals` (Strategy-Selector -> Position-Finder).

pub mod amqp;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use rust_decimal::Decimal;

/// Message on the `backtest-tasks` queue (Scanner -> Backtest-Analyzer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestTask {
    pub scan_id: String,
    pub symbol: String,
    pub timeframe: String,
    pub volatility_24h: Decimal,
    pub turnover: Decimal,
    pub price: Decimal,
    pub price_change_24h: Decimal,
    pub timestamp: i64,
}

/// Message on the `trading-signals` queue (Strategy-Selector -> Position-Finder).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingSignalTask {
    pub selector_id: String,
    pub symbol: String,
    pub timeframe: String,
    pub strategy: String,
    pub win_rate: Decimal,
    pub total_pnl: Decimal,
    pub confidence_avg: Decimal,
    pub scan_id: String,
    pub volatility_24h: Decimal,
    pub price: Decimal,
    pub timestamp: i64,
}

/// A delivery handed back to the consumer; dropping it without acking or
/// nacking leaves the message unsettled, so callers must always do one or
/// the other.
#[async_trait]
pub trait Delivery: Send + Sync {
    fn body(&self) -> &[u8];
    async fn ack(self: Box<Self>) -> Result<()>;
    async fn nack_requeue(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()>;
    async fn consume_one(&self, queue: &str) -> Result<Option<Box<dyn Delivery>>>;
}

pub async fn publish_backtest_task(broker: &dyn Broker, queue: &str, task: &BacktestTask) -> Result<()> {
    let payload = serde_json::to_vec(task).map_err(|e| crate::error::PipelineError::Other(e.into()))?;
    broker.publish(queue, &payload).await
}

pub async fn publish_trading_signal(broker: &dyn Broker, queue: &str, task: &TradingSignalTask) -> Result<()> {
    let payload = serde_json::to_vec(task).map_err(|e| crate::error::PipelineError::Other(e.into()))?;
    broker.publish(queue, &payload).await
}
