//! Results/ScanHistory persistence row shapes (spec.md §3, §6).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::signal::BestStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeframeStatus {
    Completed,
    NoTrades,
    Failed,
}

/// One timeframe's backtest aggregate, stored inside a `ScanRecord`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeResult {
    pub total_trades: u32,
    pub win_rate: Decimal,
    pub total_pnl: Decimal,
    pub avg_win: Decimal,
    pub avg_loss: Decimal,
    pub confidence_avg: Decimal,
    pub best_strategy: BestStrategy,
    pub analysis_time: DateTime<Utc>,
    pub status: TimeframeStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStatus {
    Active,
    Inactive,
}

/// Results table row: primary key (symbol, scan_timestamp). TTL 24h.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    pub symbol: String,
    pub scan_timestamp: i64,
    pub status: ScanStatus,
    pub last_price: Decimal,
    pub turnover_24h: Decimal,
    pub price_change_pct_24h: Decimal,
    pub timeframes: HashMap<String, TimeframeResult>,
    pub optimal_timeframe: Option<String>,
    pub optimal_pnl: Decimal,
    pub optimal_win_rate: Decimal,
    pub ttl: i64,
}

impl ScanRecord {
    pub fn new(
        symbol: String,
        scan_timestamp: i64,
        last_price: Decimal,
        turnover_24h: Decimal,
        price_change_pct_24h: Decimal,
    ) -> Self {
        Self {
            symbol,
            scan_timestamp,
            status: ScanStatus::Active,
            last_price,
            turnover_24h,
            price_change_pct_24h,
            timeframes: HashMap::new(),
            optimal_timeframe: None,
            optimal_pnl: Decimal::ZERO,
            optimal_win_rate: Decimal::ZERO,
            ttl: scan_timestamp + 86_400,
        }
    }

    /// Upsert one timeframe's result and recompute `optimal_*` as the
    /// timeframe with the largest `total_pnl` (spec.md §4.3).
    pub fn upsert_timeframe(&mut self, timeframe: String, result: TimeframeResult) {
        self.timeframes.insert(timeframe, result);
        self.recompute_optimal();
    }

    fn recompute_optimal(&mut self) {
        let best = self
            .timeframes
            .iter()
            .max_by(|a, b| a.1.total_pnl.cmp(&b.1.total_pnl));
        if let Some((tf, result)) = best {
            self.optimal_timeframe = Some(tf.clone());
            self.optimal_pnl = result.total_pnl;
            self.optimal_win_rate = result.win_rate;
        }
    }
}

/// ScanHistory table row: primary key (scan_id, scan_timestamp). TTL 7d.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanHistory {
    pub scan_id: String,
    pub scan_timestamp: i64,
    pub selected_symbols: Vec<String>,
    pub removed_symbols: Vec<String>,
    pub ttl: i64,
}

impl ScanHistory {
    pub fn new(scan_id: String, scan_timestamp: i64, selected: Vec<String>, removed: Vec<String>) -> Self {
        Self {
            scan_id,
            scan_timestamp,
            selected_symbols: selected,
            removed_symbols: removed,
            ttl: scan_timestamp + 7 * 86_400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn result(pnl: Decimal) -> TimeframeResult {
        TimeframeResult {
            total_trades: 10,
            win_rate: dec!(50),
            total_pnl: pnl,
            avg_win: dec!(10),
            avg_loss: dec!(5),
            confidence_avg: dec!(70),
            best_strategy: BestStrategy::Advanced,
            analysis_time: Utc::now(),
            status: TimeframeStatus::Completed,
        }
    }

    #[test]
    fn optimal_picks_largest_pnl() {
        let mut rec = ScanRecord::new("BTCUSDT".into(), 0, dec!(1), dec!(1), dec!(1));
        rec.upsert_timeframe("5".into(), result(dec!(50)));
        rec.upsert_timeframe("15".into(), result(dec!(120)));
        rec.upsert_timeframe("30".into(), result(dec!(80)));
        assert_eq!(rec.optimal_timeframe, Some("15".to_string()));
        assert_eq!(rec.optimal_pnl, dec!(120));
    }
}
