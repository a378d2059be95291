//! Symbol metadata and instrument trading rules (spec.md §3).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Exchange-imposed quantisation and bounds for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstrumentRules {
    pub price_tick: Decimal,
    pub min_price: Decimal,
    pub qty_step: Decimal,
    pub min_qty: Decimal,
    pub max_qty: Decimal,
    pub price_decimals: u32,
    pub qty_decimals: u32,
}

/// A snapshot of one symbol's market metrics at a point in time, as
/// returned by the exchange ticker feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub last_price: Decimal,
    pub bid_price: Decimal,
    pub ask_price: Decimal,
    pub turnover_24h: Decimal,
    pub volume_24h: Decimal,
    pub price_change_pct_24h: Decimal,
    pub high_24h: Decimal,
    pub low_24h: Decimal,
    pub funding_rate: Decimal,
    pub rules: InstrumentRules,
}
