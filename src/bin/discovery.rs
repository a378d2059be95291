//! Discovery service binary: every `discovery_interval`, ranks liquid
//! symbols and publishes the set Scanner instances read from.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use omni::exchange::bybit::BybitClient;
use omni::kv::memory::InMemoryKv;
use omni::kv::redis_store::RedisKv;
use omni::kv::Kv;
use omni::services::discovery;
use omni::Settings;

#[derive(Parser)]
#[command(name = "discovery", about = "Ranks liquid linear-perpetual symbols for the scanner fleet")]
struct Args {
    /// Use the in-process KV store instead of connecting to Redis.
    #[arg(long)]
    in_memory_kv: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let settings = Settings::load()?;
    let exchange = BybitClient::new(&settings.exchange);

    let kv: Arc<dyn Kv> = if args.in_memory_kv {
        Arc::new(InMemoryKv::default())
    } else {
        Arc::new(RedisKv::connect(&settings.kv).await?)
    };

    info!(interval_secs = settings.trading.discovery_interval.as_secs(), "discovery starting");

    let mut ticker = tokio::time::interval(settings.trading.discovery_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = discovery::run_once(&exchange, kv.as_ref(), &settings.trading).await {
                    error!(error = %err, "discovery cycle failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received, stopping discovery");
                return Ok(());
            }
        }
    }
}
