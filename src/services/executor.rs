//! Order-Executor (spec.md §4.6): the only service permitted to place
//! orders. Runs as a singleton (invariant I5's correctness constraint, not
//! a performance choice); every `scan_interval` it re-validates each
//! active proposal against live exchange state before committing capital.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};

use crate::config::TradingConfig;
use crate::error::Result;
use crate::exchange::{ExchangeClient, OrderRequest, OrderSide};
use crate::persistence::PositionsStore;
use crate::types::{snap_to_step, InstrumentRules, PositionProposal, PositionStatus, PositionType, SymbolInfo};

const NO_CHASE_LONG: Decimal = dec!(1.002);
const NO_CHASE_SHORT: Decimal = dec!(0.998);
const PRICE_TOLERANCE: Decimal = dec!(0.005);
const SPREAD_TOLERANCE: Decimal = dec!(0.001);
const MIN_24H_VOLUME: Decimal = dec!(1000);

fn entry_gates_hold(proposal: &PositionProposal, ticker: &SymbolInfo, config: &TradingConfig) -> bool {
    if proposal.confidence < config.min_confidence {
        return false;
    }
    if proposal.entry_price.is_zero() {
        return false;
    }
    let price_diff_pct = (ticker.last_price - proposal.entry_price).abs() / proposal.entry_price;
    if price_diff_pct > PRICE_TOLERANCE {
        return false;
    }

    let no_chase_ok = match proposal.position_type {
        PositionType::Long => ticker.last_price <= proposal.entry_price * NO_CHASE_LONG,
        PositionType::Short => ticker.last_price >= proposal.entry_price * NO_CHASE_SHORT,
    };
    if !no_chase_ok {
        return false;
    }

    if !ticker.bid_price.is_zero() {
        let spread_pct = (ticker.ask_price - ticker.bid_price) / ticker.bid_price;
        if spread_pct > SPREAD_TOLERANCE {
            return false;
        }
    }

    ticker.volume_24h >= MIN_24H_VOLUME
}

fn order_quantity(proposal: &PositionProposal, rules: &InstrumentRules, config: &TradingConfig) -> Decimal {
    let raw = config.position_size * Decimal::from(config.leverage) / proposal.entry_price;
    let snapped = snap_to_step(raw, rules.qty_step);
    snapped.clamp(rules.min_qty, rules.max_qty).round_dp(rules.qty_decimals)
}

/// Capital already committed by this process's own open executions, used
/// as the margin-in-use proxy (the exchange-client capability set exposed
/// here does not carry per-position size/avg-price, only symbols).
async fn used_margin(positions: &dyn PositionsStore) -> Result<Decimal> {
    let mut total = Decimal::ZERO;
    for proposal in positions.active().await? {
        if matches!(proposal.status, PositionStatus::Executing | PositionStatus::Filled) {
            total += proposal.position_size;
        }
    }
    Ok(total)
}

/// Run one executor sweep over every active proposal, most recent first.
pub async fn run_once(exchange: &dyn ExchangeClient, positions: &dyn PositionsStore, config: &TradingConfig) -> Result<()> {
    let mut actives = positions.active().await?;
    actives.sort_by_key(|p| std::cmp::Reverse(p.signal_timestamp));

    for proposal in actives {
        if let Err(err) = try_execute(&proposal, exchange, positions, config).await {
            warn!(symbol = %proposal.symbol, error = %err, "order-executor: leaving proposal active for next cycle");
        }
    }
    Ok(())
}

async fn try_execute(proposal: &PositionProposal, exchange: &dyn ExchangeClient, positions: &dyn PositionsStore, config: &TradingConfig) -> Result<()> {
    let Some(ticker) = exchange.get_ticker(&proposal.symbol).await? else {
        return Ok(());
    };
    if !entry_gates_hold(proposal, &ticker, config) {
        return Ok(());
    }

    if exchange.get_open_positions().await?.iter().any(|s| s == &proposal.symbol) {
        info!(symbol = %proposal.symbol, "order-executor dropping: exchange already has a position open");
        return Ok(());
    }

    let available = exchange.get_wallet_balance().await? - used_margin(positions).await?;
    let required_margin = config.position_size / Decimal::from(config.leverage);
    if available < required_margin {
        info!(symbol = %proposal.symbol, "order-executor dropping: insufficient available margin");
        return Ok(());
    }

    exchange.set_leverage(&proposal.symbol, config.leverage).await?;

    let rules = exchange.get_instrument_rules(&proposal.symbol).await?;
    let qty = order_quantity(proposal, &rules, config);
    if qty.is_zero() {
        return Ok(());
    }

    let side = match proposal.position_type {
        PositionType::Long => OrderSide::Buy,
        PositionType::Short => OrderSide::Sell,
    };

    let ack = exchange
        .place_order(OrderRequest {
            symbol: proposal.symbol.clone(),
            side,
            qty,
            take_profit: proposal.take_profit,
            stop_loss: proposal.stop_loss,
            leverage: config.leverage,
        })
        .await?;

    info!(symbol = %proposal.symbol, order_id = %ack.order_id, "order-executor placed bracket order");
    positions
        .update_status(
            &proposal.symbol,
            proposal.signal_timestamp,
            PositionStatus::Active,
            PositionStatus::Executing,
        )
        .await
}
