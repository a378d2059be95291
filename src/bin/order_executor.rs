//! Order-Executor service binary: the only process permitted to place
//! orders. Must run as a singleton (spec.md §5/§9) — enforce with a leader
//! lock or an orchestrator-level desiredCount=1, neither of which this
//! binary does on its own.

use clap::Parser;
use tracing::{error, info};

use omni::exchange::bybit::BybitClient;
use omni::persistence::memory::InMemoryPositionsStore;
use omni::persistence::sqlite::SqlitePersistence;
use omni::persistence::PositionsStore;
use omni::services::executor;
use omni::Settings;

#[derive(Parser)]
#[command(name = "order-executor", about = "Places bracketed market orders for active position proposals")]
struct Args {
    /// Use a process-local store instead of the shared SQLite database;
    /// state will not be visible to other service processes.
    #[arg(long)]
    in_memory_db: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let settings = Settings::load()?;
    let exchange = BybitClient::new(&settings.exchange);
    let positions: Box<dyn PositionsStore> = if args.in_memory_db {
        Box::new(InMemoryPositionsStore::default())
    } else {
        Box::new(SqlitePersistence::connect(&settings.persistence).await?)
    };

    info!(interval_secs = settings.trading.scan_interval.as_secs(), "order-executor starting");

    let mut ticker = tokio::time::interval(settings.trading.scan_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = executor::run_once(&exchange, positions.as_ref(), &settings.trading).await {
                    error!(error = %err, "order-executor cycle failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received, stopping order-executor");
                return Ok(());
            }
        }
    }
}
