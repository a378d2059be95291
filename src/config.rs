//! Environment-driven configuration, shared by every service binary.
//!
//! Follows the teacher's `demo.env` / `dotenv` convention (upgraded to the
//! maintained `dotenvy` fork) but centralizes parsing into one struct rather
//! than scattering `env::var(...).expect(...)` calls across binaries.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::env;
use std::time::Duration;

use crate::error::{PipelineError, Result};
use crate::persistence::sqlite::PersistenceConfig;

#[derive(Debug, Clone)]
pub struct ExchangeCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub testnet: bool,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub queue_prefix: String,
    pub use_tls: bool,
}

#[derive(Debug, Clone)]
pub struct KvConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct TradingConfig {
    pub position_size: Decimal,
    pub leverage: u32,
    pub scan_interval: Duration,
    pub discovery_interval: Duration,
    pub min_volume_24h: Decimal,
    pub min_volatility_pct: Decimal,
    pub min_win_rate: Decimal,
    pub min_pnl: Decimal,
    pub min_trades: u32,
    pub min_confidence: Decimal,
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
    pub taker_fee: Decimal,
    pub min_profit_target: Decimal,
    pub bb_period: usize,
    pub bb_std: Decimal,
    pub fib_tolerance: Decimal,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            position_size: dec!(100),
            leverage: 10,
            scan_interval: Duration::from_secs(5),
            discovery_interval: Duration::from_secs(24 * 3600),
            min_volume_24h: dec!(1_000_000),
            min_volatility_pct: dec!(2.0),
            min_win_rate: dec!(45),
            min_pnl: dec!(100),
            min_trades: 20,
            min_confidence: dec!(60),
            stop_loss_pct: dec!(1.0),
            take_profit_pct: dec!(2.0),
            taker_fee: dec!(0.0006),
            min_profit_target: dec!(7.0),
            bb_period: 20,
            bb_std: dec!(2),
            fib_tolerance: dec!(0.02),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub exchange: ExchangeCredentials,
    pub broker: BrokerConfig,
    pub kv: KvConfig,
    pub trading: TradingConfig,
    pub persistence: PersistenceConfig,
}

impl Settings {
    /// Load settings from the process environment, after attempting to
    /// load a local `.env` file. Missing/malformed required values are a
    /// `Fatal` error: the caller should log and exit non-zero.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let exchange = ExchangeCredentials {
            api_key: env_var("BYBIT_API_KEY")?,
            api_secret: env_var("BYBIT_API_SECRET")?,
            testnet: env_bool("BYBIT_TESTNET", true),
        };

        let broker = BrokerConfig {
            host: env_or("RABBITMQ_HOST", "localhost"),
            port: env_parse_or("RABBITMQ_PORT", 5672)?,
            user: env_or("RABBITMQ_USER", "guest"),
            pass: env_or("RABBITMQ_PASS", "guest"),
            queue_prefix: env_or("RABBITMQ_QUEUE", "omni"),
            use_tls: env_bool("RABBITMQ_TLS", false),
        };

        let kv = KvConfig {
            host: env_or("REDIS_HOST", "localhost"),
            port: env_parse_or("REDIS_PORT", 6379)?,
        };

        let persistence = PersistenceConfig {
            db_path: env_or("SQLITE_DB_PATH", "data/omni.db"),
            max_connections: env_parse_or("SQLITE_MAX_CONNECTIONS", 5)?,
        };

        let mut trading = TradingConfig::default();
        if let Ok(v) = env::var("POSITION_SIZE") {
            trading.position_size = parse_decimal("POSITION_SIZE", &v)?;
        }
        if let Ok(v) = env::var("LEVERAGE") {
            trading.leverage = parse_u32("LEVERAGE", &v)?;
        }
        if let Ok(v) = env::var("SCAN_INTERVAL") {
            trading.scan_interval = Duration::from_secs(parse_u32("SCAN_INTERVAL", &v)? as u64);
        }
        if let Ok(v) = env::var("DISCOVERY_INTERVAL") {
            trading.discovery_interval =
                Duration::from_secs(parse_u32("DISCOVERY_INTERVAL", &v)? as u64);
        }
        if let Ok(v) = env::var("MIN_VOLUME_24H") {
            trading.min_volume_24h = parse_decimal("MIN_VOLUME_24H", &v)?;
        }
        if let Ok(v) = env::var("MIN_VOLATILITY_PCT") {
            trading.min_volatility_pct = parse_decimal("MIN_VOLATILITY_PCT", &v)?;
        }
        if let Ok(v) = env::var("MIN_WIN_RATE") {
            trading.min_win_rate = parse_decimal("MIN_WIN_RATE", &v)?;
        }
        if let Ok(v) = env::var("MIN_PNL") {
            trading.min_pnl = parse_decimal("MIN_PNL", &v)?;
        }
        if let Ok(v) = env::var("MIN_TRADES") {
            trading.min_trades = parse_u32("MIN_TRADES", &v)?;
        }
        if let Ok(v) = env::var("MIN_CONFIDENCE") {
            trading.min_confidence = parse_decimal("MIN_CONFIDENCE", &v)?;
        }

        Ok(Self {
            exchange,
            broker,
            kv,
            trading,
            persistence,
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    env::var(key).map_err(|_| PipelineError::Fatal(format!("{key} not set")))
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(default)
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|_| PipelineError::Fatal(format!("{key} is not a valid value: {v}"))),
        Err(_) => Ok(default),
    }
}

fn parse_decimal(key: &str, v: &str) -> Result<Decimal> {
    v.parse()
        .map_err(|_| PipelineError::Fatal(format!("{key} is not a valid decimal: {v}")))
}

fn parse_u32(key: &str, v: &str) -> Result<u32> {
    v.parse()
        .map_err(|_| PipelineError::Fatal(format!("{key} is not a valid integer: {v}")))
}
