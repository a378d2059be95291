//! Exchange client abstraction for the single linear-perpetuals venue
//! (spec.md §6.4). Production implementation is Bybit's v5 REST API,
//! grounded in the teacher's HMAC-signed request pattern.

pub mod bybit;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::Result;
use crate::types::{Candle, InstrumentRules, SymbolInfo, Timeframe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub qty: Decimal,
    pub take_profit: Decimal,
    pub stop_loss: Decimal,
    pub leverage: u32,
}

#[derive(Debug, Clone)]
pub struct OrderAck {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub qty: Decimal,
}

#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn get_klines(&self, symbol: &str, timeframe: Timeframe, limit: u32) -> Result<Vec<Candle>>;
    async fn get_tickers(&self) -> Result<Vec<SymbolInfo>>;
    async fn get_ticker(&self, symbol: &str) -> Result<Option<SymbolInfo>>;
    async fn get_instrument_rules(&self, symbol: &str) -> Result<InstrumentRules>;
    async fn get_funding_rate(&self, symbol: &str) -> Result<Decimal>;
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()>;
    async fn place_order(&self, request: OrderRequest) -> Result<OrderAck>;
    async fn get_open_positions(&self) -> Result<Vec<String>>;
    async fn get_wallet_balance(&self) -> Result<Decimal>;
    async fn has_open_order(&self, symbol: &str) -> Result<bool>;
}
