//! Scanner: the implied actor of spec.md §3/§5/§9 that bridges Discovery's
//! symbol set to the Backtest-Analyzer fleet. Reads `discovery:latest`,
//! diffs the selected set against the previous `ScanHistory` row, writes a
//! fresh `ScanHistory`, garbage-collects `Results` rows for symbols that
//! dropped out of discovery (invariant I6), and publishes one
//! `backtest-tasks` message per (symbol, timeframe).

use std::collections::HashSet;

use uuid::Uuid;

use crate::broker::{publish_backtest_task, BacktestTask, Broker};
use crate::error::Result;
use crate::kv::Kv;
use crate::persistence::ResultsStore;
use crate::services::discovery;
use crate::services::BACKTEST_TIMEFRAMES;
use crate::types::ScanHistory;
use crate::persistence::ScanHistoryStore;

pub const BACKTEST_QUEUE: &str = "backtest-tasks";

/// Run one scan cycle. Returns `Ok(0)` with no side effects if Discovery
/// has not published a symbol set yet.
pub async fn run_once(
    instance_id: &str,
    kv: &dyn Kv,
    results: &dyn ResultsStore,
    scan_history: &dyn ScanHistoryStore,
    broker: &dyn Broker,
) -> Result<usize> {
    discovery::heartbeat(kv, instance_id).await?;

    let Some(snapshot) = discovery::latest(kv).await? else {
        return Ok(0);
    };

    let previous_selected: HashSet<String> = scan_history
        .latest()
        .await?
        .map(|h| h.selected_symbols.into_iter().collect())
        .unwrap_or_default();
    let selected: HashSet<String> = snapshot.symbols.iter().cloned().collect();
    let removed: Vec<String> = previous_selected.difference(&selected).cloned().collect();

    let scan_id = Uuid::new_v4().to_string();
    let scan_timestamp = chrono::Utc::now().timestamp();
    scan_history
        .put(ScanHistory::new(
            scan_id.clone(),
            scan_timestamp,
            snapshot.symbols.clone(),
            removed,
        ))
        .await?;

    gc_stale_results(results, &selected).await?;

    let mut published = 0;
    for detail in &snapshot.details {
        for minutes in BACKTEST_TIMEFRAMES {
            let task = BacktestTask {
                scan_id: scan_id.clone(),
                symbol: detail.symbol.clone(),
                timeframe: minutes.to_string(),
                volatility_24h: detail.price_change_pct_24h.abs(),
                turnover: detail.turnover_24h,
                price: detail.last_price,
                price_change_24h: detail.price_change_pct_24h,
                timestamp: scan_timestamp,
            };
            publish_backtest_task(broker, BACKTEST_QUEUE, &task).await?;
            published += 1;
        }
    }
    Ok(published)
}

/// Delete every Results row for a symbol no longer in the latest Discovery
/// set (invariant I6: "within one cycle").
async fn gc_stale_results(results: &dyn ResultsStore, selected: &HashSet<String>) -> Result<()> {
    for row in results.all().await? {
        if !selected.contains(&row.symbol) {
            results.delete(&row.symbol, row.scan_timestamp).await?;
        }
    }
    Ok(())
}
