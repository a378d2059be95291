//! Strategy-Selector (spec.md §4.4): scans the Results table for active
//! scorecards meeting the win-rate/PnL/trade-count thresholds and
//! publishes one `trading-signals` message per eligible (symbol, timeframe).

use tracing::info;

use crate::broker::{publish_trading_signal, Broker, TradingSignalTask};
use crate::config::TradingConfig;
use crate::error::Result;
use crate::persistence::ResultsStore;
use crate::types::scan::ScanStatus;

pub const TRADING_SIGNALS_QUEUE: &str = "trading-signals";

fn eligible(record: &crate::types::ScanRecord, config: &TradingConfig) -> Option<(&String, &crate::types::TimeframeResult)> {
    if record.status != ScanStatus::Active {
        return None;
    }
    let timeframe = record.optimal_timeframe.as_ref()?;
    let result = record.timeframes.get(timeframe)?;

    if record.optimal_win_rate < config.min_win_rate {
        return None;
    }
    if record.optimal_pnl < config.min_pnl {
        return None;
    }
    if result.total_trades < config.min_trades {
        return None;
    }
    Some((timeframe, result))
}

/// Run one selection cycle, returning the number of signals published.
pub async fn run_once(selector_id: &str, results: &dyn ResultsStore, broker: &dyn Broker, config: &TradingConfig) -> Result<usize> {
    let mut published = 0;
    for record in results.all_active().await? {
        let Some((timeframe, result)) = eligible(&record, config) else {
            continue;
        };

        let task = TradingSignalTask {
            selector_id: selector_id.to_string(),
            symbol: record.symbol.clone(),
            timeframe: timeframe.clone(),
            strategy: format!("{:?}", result.best_strategy),
            win_rate: record.optimal_win_rate,
            total_pnl: record.optimal_pnl,
            confidence_avg: result.confidence_avg,
            scan_id: format!("{}-{}", record.symbol, record.scan_timestamp),
            volatility_24h: record.price_change_pct_24h.abs(),
            price: record.last_price,
            timestamp: chrono::Utc::now().timestamp(),
        };
        publish_trading_signal(broker, TRADING_SIGNALS_QUEUE, &task).await?;
        published += 1;
    }
    info!(published, "strategy-selector cycle complete");
    Ok(published)
}
