//! Scanner service binary: diffs Discovery's symbol set against the
//! previous scan, garbage-collects stale Results rows, and fans every
//! selected symbol out to the `backtest-tasks` queue.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use uuid::Uuid;

use omni::broker::amqp::AmqpBroker;
use omni::broker::memory::InMemoryBroker;
use omni::broker::Broker;
use omni::kv::memory::InMemoryKv;
use omni::kv::redis_store::RedisKv;
use omni::kv::Kv;
use omni::persistence::memory::InMemoryResultsStore;
use omni::persistence::memory::InMemoryScanHistoryStore;
use omni::persistence::sqlite::SqlitePersistence;
use omni::persistence::{ResultsStore, ScanHistoryStore};
use omni::services::scanner;
use omni::Settings;

#[derive(Parser)]
#[command(name = "scanner", about = "Fans discovered symbols out to the backtest-analyzer fleet")]
struct Args {
    /// Stable instance id used for the Discovery heartbeat/liveness set.
    #[arg(long)]
    instance_id: Option<String>,

    #[arg(long)]
    in_memory_kv: bool,

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
    let instance_id = args.instance_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let settings = Settings::load()?;

    let kv: Arc<dyn Kv> = if args.in_memory_kv {
        Arc::new(InMemoryKv::default())
    } else {
        Arc::new(RedisKv::connect(&settings.kv).await?)
    };

    let (results, scan_history): (Arc<dyn ResultsStore>, Arc<dyn ScanHistoryStore>) = if args.in_memory_db {
        (Arc::new(InMemoryResultsStore::default()), Arc::new(InMemoryScanHistoryStore::default()))
    } else {
        let db = Arc::new(SqlitePersistence::connect(&settings.persistence).await?);
        (db.clone() as Arc<dyn ResultsStore>, db as Arc<dyn ScanHistoryStore>)
    };
    let broker: Arc<dyn Broker> = if args.in_memory_broker {
        Arc::new(InMemoryBroker::default())
    } else {
        Arc::new(AmqpBroker::connect(&settings.broker).await?)
    };

    info!(instance_id, interval_secs = settings.trading.scan_interval.as_secs(), "scanner starting");

    let mut ticker = tokio::time::interval(settings.trading.scan_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match scanner::run_once(&instance_id, kv.as_ref(), results.as_ref(), scan_history.as_ref(), broker.as_ref()).await {
                    Ok(published) => info!(published, "scanner cycle complete"),
                    Err(err) => error!(error = %err, "scanner cycle failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received, stopping scanner");
                return Ok(());
            }
        }
    }
}
