//! Positions table row shape (spec.md §3, §4.5).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::signal::{DirectionalSignal, FundingInfo, StrategyKind, TrendSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionType {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Active,
    Executing,
    Filled,
    Rejected,
    Expired,
}

/// Positions table row: primary key (symbol, signal_timestamp). TTL 5m.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionProposal {
    pub symbol: String,
    pub signal_timestamp: DateTime<Utc>,
    pub status: PositionStatus,
    pub strategy: StrategyKind,
    pub timeframe: String,
    pub confidence: Decimal,
    pub position_type: PositionType,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub position_size: Decimal,
    pub leverage: u32,
    pub rsi: Decimal,
    pub bb_position: Decimal,
    pub bb_width: Decimal,
    pub btc_trend: TrendSnapshot,
    pub coin_trend: TrendSnapshot,
    pub funding: FundingInfo,
    pub nearest_support: Option<Decimal>,
    pub nearest_resistance: Option<Decimal>,
    pub expected_profit: Decimal,
    pub expected_loss: Decimal,
    pub risk_reward_ratio: Decimal,
    pub signal_id: String,
    pub scan_id: String,
    pub version: u32,
    pub ttl: i64,
}

impl PositionProposal {
    /// Build a proposal from a fired `DirectionalSignal` plus the shared
    /// trend/funding/fib context and a sized position, before exchange
    /// submission (spec.md §4.5).
    #[allow(clippy::too_many_arguments)]
    pub fn from_signal(
        symbol: String,
        position_type: PositionType,
        signal: &DirectionalSignal,
        timeframe: String,
        position_size: Decimal,
        leverage: u32,
        btc_trend: TrendSnapshot,
        coin_trend: TrendSnapshot,
        funding: FundingInfo,
        nearest_support: Option<Decimal>,
        nearest_resistance: Option<Decimal>,
        signal_id: String,
        scan_id: String,
    ) -> Self {
        let ttl = signal.timestamp.timestamp() + 300;
        Self {
            symbol,
            signal_timestamp: signal.timestamp,
            status: PositionStatus::Active,
            strategy: signal.strategy,
            timeframe,
            confidence: signal.confidence,
            position_type,
            entry_price: signal.entry_price,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            position_size,
            leverage,
            rsi: signal.rsi,
            bb_position: signal.bb_position,
            bb_width: signal.bb_width,
            btc_trend,
            coin_trend,
            funding,
            nearest_support,
            nearest_resistance,
            expected_profit: signal.expected_profit,
            expected_loss: signal.expected_loss,
            risk_reward_ratio: if signal.expected_loss.is_zero() {
                Decimal::ZERO
            } else {
                signal.expected_profit / signal.expected_loss
            },
            signal_id,
            scan_id,
            version: 1,
            ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.ttl
    }
}
