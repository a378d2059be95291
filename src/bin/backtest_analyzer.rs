//! Backtest-Analyzer service binary: consumes `backtest-tasks` and upserts
//! a scorecard per (symbol, timeframe) into the Results table.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use omni::broker::amqp::AmqpBroker;
use omni::broker::memory::InMemoryBroker;
use omni::broker::Broker;
use omni::exchange::bybit::BybitClient;
use omni::persistence::memory::InMemoryResultsStore;
use omni::persistence::sqlite::SqlitePersistence;
use omni::persistence::ResultsStore;
use omni::services::analyzer;
use omni::services::scanner::BACKTEST_QUEUE;
use omni::Settings;

#[derive(Parser)]
#[command(name = "backtest-analyzer", about = "Scores every backtest-tasks message against historical candles")]
struct Args {
    #[arg(long)]
    in_memory_broker: bool,

    /// Use a process-local store instead of the shared SQLite database;
    /// state will not be visible to other service processes.
    #[arg(long)]
    in_memory_db: bool,

    /// How long to sleep after an empty poll before retrying.
    #[arg(long, default_value_t = 1)]
    idle_poll_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let settings = Settings::load()?;
    let exchange = BybitClient::new(&settings.exchange);
    let results: Arc<dyn ResultsStore> = if args.in_memory_db {
        Arc::new(InMemoryResultsStore::default())
    } else {
        Arc::new(SqlitePersistence::connect(&settings.persistence).await?)
    };

    let broker: Arc<dyn Broker> = if args.in_memory_broker {
        Arc::new(InMemoryBroker::default())
    } else {
        Arc::new(AmqpBroker::connect(&settings.broker).await?)
    };

    info!("backtest-analyzer starting");
    let idle = Duration::from_secs(args.idle_poll_secs);

    loop {
        tokio::select! {
            delivery = broker.consume_one(BACKTEST_QUEUE) => {
                match delivery {
                    Ok(Some(delivery)) => handle_delivery(delivery, &exchange, results.as_ref(), &settings).await,
                    Ok(None) => tokio::time::sleep(idle).await,
                    Err(err) => {
                        error!(error = %err, "broker poll failed");
                        tokio::time::sleep(idle).await;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received, stopping backtest-analyzer");
                return Ok(());
            }
        }
    }
}

async fn handle_delivery(
    delivery: Box<dyn omni::broker::Delivery>,
    exchange: &BybitClient,
    results: &dyn ResultsStore,
    settings: &Settings,
) {
    let task: omni::broker::BacktestTask = match serde_json::from_slice(delivery.body()) {
        Ok(task) => task,
        Err(err) => {
            warn!(error = %err, "malformed backtest task, acking and dropping");
            let _ = delivery.ack().await;
            return;
        }
    };

    match analyzer::process_task(&task, exchange, results, &settings.trading).await {
        Ok(()) => {
            if let Err(err) = delivery.ack().await {
                error!(error = %err, "ack failed");
            }
        }
        Err(err) if err.should_requeue() => {
            warn!(error = %err, symbol = %task.symbol, "requeueing backtest task");
            let _ = delivery.nack_requeue().await;
        }
        Err(err) => {
            error!(error = %err, symbol = %task.symbol, "dropping backtest task after failure");
            let _ = delivery.ack().await;
        }
    }
}
