//! Strategy-Selector service binary: every `scan_interval`, scans the
//! Results table for scorecards clearing the win-rate/PnL/trade-count
//! thresholds and publishes a `trading-signals` message per eligible row.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use uuid::Uuid;

use omni::broker::amqp::AmqpBroker;
use omni::broker::memory::InMemoryBroker;
use omni::broker::Broker;
use omni::persistence::memory::InMemoryResultsStore;
use omni::persistence::sqlite::SqlitePersistence;
use omni::persistence::ResultsStore;
use omni::services::selector;
use omni::Settings;

#[derive(Parser)]
#[command(name = "strategy-selector", about = "Promotes winning scorecards to trading signals")]
struct Args {
    #[arg(long)]
    selector_id: Option<String>,

    #[arg(long)]
    in_memory_broker: bool,

    /// Use a process-local store instead of the shared SQLite database;
    /// state will not be visible to other service processes.
    #[arg(long)]
    in_memory_db: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let selector_id = args.selector_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let settings = Settings::load()?;

    let results: Box<dyn ResultsStore> = if args.in_memory_db {
        Box::new(InMemoryResultsStore::default())
    } else {
        Box::new(SqlitePersistence::connect(&settings.persistence).await?)
    };
    let broker: Arc<dyn Broker> = if args.in_memory_broker {
        Arc::new(InMemoryBroker::default())
    } else {
        Arc::new(AmqpBroker::connect(&settings.broker).await?)
    };

    info!(selector_id, interval_secs = settings.trading.scan_interval.as_secs(), "strategy-selector starting");

    let mut ticker = tokio::time::interval(settings.trading.scan_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match selector::run_once(&selector_id, results.as_ref(), broker.as_ref(), &settings.trading).await {
                    Ok(published) => info!(published, "strategy-selector cycle complete"),
                    Err(err) => error!(error = %err, "strategy-selector cycle failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received, stopping strategy-selector");
                return Ok(());
            }
        }
    }
}
