//! Position-Finder service binary: consumes `trading-signals`, re-checks
//! the entry engine on the latest candle, and writes a sized proposal to
//! the Positions table if nothing already covers the symbol.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use omni::broker::amqp::AmqpBroker;
use omni::broker::memory::InMemoryBroker;
use omni::broker::Broker;
use omni::exchange::bybit::BybitClient;
use omni::persistence::memory::InMemoryPositionsStore;
use omni::persistence::sqlite::SqlitePersistence;
use omni::persistence::PositionsStore;
use omni::services::finder;
use omni::services::selector::TRADING_SIGNALS_QUEUE;
use omni::Settings;

#[derive(Parser)]
#[command(name = "position-finder", about = "Turns promoted trading signals into sized position proposals")]
struct Args {
    #[arg(long)]
    in_memory_broker: bool,

    /// Use a process-local store instead of the shared SQLite database;
    /// state will not be visible to other service processes.
    #[arg(long)]
    in_memory_db: bool,

    #[arg(long, default_value_t = 1)]
    idle_poll_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let settings = Settings::load()?;
    let exchange = BybitClient::new(&settings.exchange);
    let positions: Arc<dyn PositionsStore> = if args.in_memory_db {
        Arc::new(InMemoryPositionsStore::default())
    } else {
        Arc::new(SqlitePersistence::connect(&settings.persistence).await?)
    };

    let broker: Arc<dyn Broker> = if args.in_memory_broker {
        Arc::new(InMemoryBroker::default())
    } else {
        Arc::new(AmqpBroker::connect(&settings.broker).await?)
    };

    info!("position-finder starting");
    let idle = Duration::from_secs(args.idle_poll_secs);

    loop {
        tokio::select! {
            delivery = broker.consume_one(TRADING_SIGNALS_QUEUE) => {
                match delivery {
                    Ok(Some(delivery)) => handle_delivery(delivery, &exchange, positions.as_ref(), &settings).await,
                    Ok(None) => tokio::time::sleep(idle).await,
                    Err(err) => {
                        error!(error = %err, "broker poll failed");
                        tokio::time::sleep(idle).await;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received, stopping position-finder");
                return Ok(());
            }
        }
    }
}

async fn handle_delivery(
    delivery: Box<dyn omni::broker::Delivery>,
    exchange: &BybitClient,
    positions: &dyn PositionsStore,
    settings: &Settings,
) {
    let task: omni::broker::TradingSignalTask = match serde_json::from_slice(delivery.body()) {
        Ok(task) => task,
        Err(err) => {
            warn!(error = %err, "malformed trading signal, acking and dropping");
            let _ = delivery.ack().await;
            return;
        }
    };

    match finder::process_task(&task, exchange, positions, &settings.trading).await {
        Ok(()) => {
            if let Err(err) = delivery.ack().await {
                error!(error = %err, "ack failed");
            }
        }
        Err(err) if err.should_requeue() => {
            warn!(error = %err, symbol = %task.symbol, "requeueing trading signal");
            let _ = delivery.nack_requeue().await;
        }
        Err(err) => {
            error!(error = %err, symbol = %task.symbol, "dropping trading signal after failure");
            let _ = delivery.ack().await;
        }
    }
}
