//! Discovery service (spec.md §4.1): every `discovery_interval`, survey all
//! linear-perpetual tickers, filter and rank them, and publish a versioned
//! symbol set into the shared KV store for the Scanner to consume.

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::TradingConfig;
use crate::error::Result;
use crate::exchange::ExchangeClient;
use crate::kv::Kv;
use crate::types::SymbolInfo;

pub const DISCOVERY_KEY: &str = "discovery:latest";
pub const VERSION_KEY: &str = "discovery:version";
const DISCOVERY_TTL: Duration = Duration::from_secs(300);
const MAX_SYMBOLS: usize = 75;
const SCANNER_ACTIVE_KEY: &str = "scanner:active";
const SCANNER_HEARTBEAT_STALENESS: Duration = Duration::from_secs(60);

const EXCLUDED_QUOTE_SUBSTRINGS: [&str; 4] = ["USDC", "BUSD", "DAI", "TUSD"];
const EXCLUDED_LEVERAGED_PATTERNS: [&str; 4] = ["UP", "DOWN", "BEAR", "BULL"];

/// The record published to `discovery:latest`: a monotonic version, the
/// cycle's timestamp, and the ranked symbol set with its ticker snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySnapshot {
    pub version: i64,
    pub timestamp: i64,
    pub symbols: Vec<String>,
    pub details: Vec<SymbolInfo>,
}

fn passes_inclusion_rules(info: &SymbolInfo, config: &TradingConfig) -> bool {
    if !info.symbol.ends_with("USDT") {
        return false;
    }
    if EXCLUDED_QUOTE_SUBSTRINGS.iter().any(|quote| info.symbol.contains(quote)) {
        return false;
    }
    if EXCLUDED_LEVERAGED_PATTERNS.iter().any(|pattern| info.symbol.contains(pattern)) {
        return false;
    }
    if info.turnover_24h < config.min_volume_24h {
        return false;
    }
    if info.price_change_pct_24h.abs() < config.min_volatility_pct {
        return false;
    }
    true
}

fn score(info: &SymbolInfo) -> Decimal {
    info.price_change_pct_24h.abs() * info.turnover_24h / dec!(1_000_000)
}

/// Run one discovery cycle. On a ticker-fetch error the cycle is skipped
/// with no partial write (spec.md §4.1's failure semantics).
pub async fn run_once(exchange: &dyn ExchangeClient, kv: &dyn Kv, config: &TradingConfig) -> Result<()> {
    let tickers = match exchange.get_tickers().await {
        Ok(tickers) => tickers,
        Err(err) => {
            warn!(error = %err, "discovery cycle skipped: ticker fetch failed");
            return Ok(());
        }
    };

    let mut candidates: Vec<SymbolInfo> = tickers
        .into_iter()
        .filter(|info| passes_inclusion_rules(info, config))
        .collect();
    candidates.sort_by(|a, b| score(b).cmp(&score(a)));
    candidates.truncate(MAX_SYMBOLS);

    let version = kv.incr(VERSION_KEY).await?;
    let snapshot = DiscoverySnapshot {
        version,
        timestamp: chrono::Utc::now().timestamp(),
        symbols: candidates.iter().map(|c| c.symbol.clone()).collect(),
        details: candidates,
    };
    let payload = serde_json::to_string(&snapshot).map_err(|e| crate::error::PipelineError::Other(e.into()))?;
    kv.set_with_ttl(DISCOVERY_KEY, &payload, DISCOVERY_TTL).await?;

    gc_stale_scanners(kv).await?;

    info!(version, count = snapshot.symbols.len(), "discovery cycle published");
    Ok(())
}

/// Read the most recently published symbol set, if any.
pub async fn latest(kv: &dyn Kv) -> Result<Option<DiscoverySnapshot>> {
    let Some(raw) = kv.get(DISCOVERY_KEY).await? else {
        return Ok(None);
    };
    let snapshot = serde_json::from_str(&raw).map_err(|e| crate::error::PipelineError::Other(e.into()))?;
    Ok(Some(snapshot))
}

/// Iterate `scanner:active` and drop any instance whose heartbeat key has
/// expired (spec.md §9: "Discovery GCs by iterating the set and checking
/// each TTL").
pub async fn gc_stale_scanners(kv: &dyn Kv) -> Result<()> {
    for instance_id in kv.smembers(SCANNER_ACTIVE_KEY).await? {
        let heartbeat_key = format!("scanner:{instance_id}:heartbeat");
        if kv.get(&heartbeat_key).await?.is_none() {
            kv.srem(SCANNER_ACTIVE_KEY, &instance_id).await?;
        }
    }
    Ok(())
}

/// Record this scanner instance as alive for `scanner_heartbeat_staleness`
/// (60s). Called once per Scanner cycle.
pub async fn heartbeat(kv: &dyn Kv, instance_id: &str) -> Result<()> {
    kv.sadd(SCANNER_ACTIVE_KEY, instance_id).await?;
    kv.set_with_ttl(
        &format!("scanner:{instance_id}:heartbeat"),
        &chrono::Utc::now().timestamp().to_string(),
        SCANNER_HEARTBEAT_STALENESS,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as PipelineResult;
    use crate::exchange::{OrderAck, OrderRequest};
    use crate::kv::memory::InMemoryKv;
    use crate::types::{Candle, InstrumentRules, Timeframe};
    use async_trait::async_trait;

    struct FakeExchange {
        tickers: Vec<SymbolInfo>,
    }

    #[async_trait]
    impl ExchangeClient for FakeExchange {
        async fn get_klines(&self, _symbol: &str, _timeframe: Timeframe, _limit: u32) -> PipelineResult<Vec<Candle>> {
            Ok(vec![])
        }
        async fn get_tickers(&self) -> PipelineResult<Vec<SymbolInfo>> {
            Ok(self.tickers.clone())
        }
        async fn get_ticker(&self, symbol: &str) -> PipelineResult<Option<SymbolInfo>> {
            Ok(self.tickers.iter().find(|t| t.symbol == symbol).cloned())
        }
        async fn get_instrument_rules(&self, _symbol: &str) -> PipelineResult<InstrumentRules> {
            unimplemented!("not exercised by discovery tests")
        }
        async fn get_funding_rate(&self, _symbol: &str) -> PipelineResult<Decimal> {
            Ok(Decimal::ZERO)
        }
        async fn set_leverage(&self, _symbol: &str, _leverage: u32) -> PipelineResult<()> {
            Ok(())
        }
        async fn place_order(&self, _request: OrderRequest) -> PipelineResult<OrderAck> {
            unimplemented!("not exercised by discovery tests")
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

    fn ticker(symbol: &str, turnover: Decimal, change_pct: Decimal) -> SymbolInfo {
        SymbolInfo {
            symbol: symbol.to_string(),
            last_price: dec!(1),
            bid_price: dec!(1),
            ask_price: dec!(1),
            turnover_24h: turnover,
            volume_24h: dec!(1000),
            price_change_pct_24h: change_pct,
            high_24h: dec!(1),
            low_24h: dec!(1),
            funding_rate: Decimal::ZERO,
            rules: InstrumentRules {
                price_tick: dec!(0.01),
                min_price: dec!(0.01),
                qty_step: dec!(0.001),
                min_qty: dec!(0.001),
                max_qty: dec!(1000),
                price_decimals: 2,
                qty_decimals: 3,
            },
        }
    }

    #[test]
    fn excludes_stablecoin_and_leveraged_pairs() {
        let config = TradingConfig::default();
        assert!(!passes_inclusion_rules(&ticker("BTCUSDCUSDT", dec!(5_000_000), dec!(5)), &config));
        assert!(!passes_inclusion_rules(&ticker("BTCUPUSDT", dec!(5_000_000), dec!(5)), &config));
        assert!(passes_inclusion_rules(&ticker("BTCUSDT", dec!(5_000_000), dec!(5)), &config));
    }

    #[test]
    fn rejects_below_volume_and_volatility_floors() {
        let config = TradingConfig::default();
        assert!(!passes_inclusion_rules(&ticker("ETHUSDT", dec!(100), dec!(5)), &config));
        assert!(!passes_inclusion_rules(&ticker("ETHUSDT", dec!(5_000_000), dec!(0.1)), &config));
    }

    #[tokio::test]
    async fn publishes_ranked_symbol_set() {
        let exchange = FakeExchange {
            tickers: vec![
                ticker("AAAUSDT", dec!(2_000_000), dec!(3)),
                ticker("BBBUSDT", dec!(10_000_000), dec!(4)),
                ticker("CCCUSDC", dec!(10_000_000), dec!(4)),
            ],
        };
        let kv = InMemoryKv::default();
        let config = TradingConfig::default();

        run_once(&exchange, &kv, &config).await.unwrap();

        let snapshot = latest(&kv).await.unwrap().unwrap();
        assert_eq!(snapshot.symbols, vec!["BBBUSDT".to_string(), "AAAUSDT".to_string()]);
        assert_eq!(snapshot.version, 1);
    }

    #[tokio::test]
    async fn stale_scanner_heartbeats_are_reaped() {
        let kv = InMemoryKv::default();
        kv.sadd(SCANNER_ACTIVE_KEY, "scanner-1").await.unwrap();
        gc_stale_scanners(&kv).await.unwrap();
        assert!(kv.smembers(SCANNER_ACTIVE_KEY).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn live_heartbeat_survives_gc() {
        let kv = InMemoryKv::default();
        heartbeat(&kv, "scanner-1").await.unwrap();
        gc_stale_scanners(&kv).await.unwrap();
        assert_eq!(kv.smembers(SCANNER_ACTIVE_KEY).await.unwrap(), vec!["scanner-1".to_string()]);
    }
}
