//! Ad-hoc backtest CLI: runs the same bar-by-bar walk the Backtest-Analyzer
//! uses in production, against one or more symbols given on the command
//! line, and prints the resulting scorecard. `--compare` sweeps the
//! {1, 3, 5}-minute timeframes for each symbol instead of a single one.

use clap::Parser;
use rust_decimal::Decimal;
use tracing::error;

use omni::broker::BacktestTask;
use omni::exchange::bybit::BybitClient;
use omni::exchange::ExchangeClient;
use omni::services::analyzer::run_analysis;
use omni::types::Timeframe;
use omni::Settings;

const COMPARE_TIMEFRAMES: [&str; 3] = ["1", "3", "5"];

#[derive(Parser)]
#[command(name = "backtest", about = "Runs an ad-hoc backtest against one or more symbols")]
struct Args {
    /// Symbols to backtest, e.g. BTCUSDT ETHUSDT.
    symbols: Vec<String>,

    /// Single timeframe in minutes to backtest (default: 5).
    #[arg(long, default_value = "5")]
    timeframe: String,

    /// Sweep {1, 3, 5}-minute timeframes per symbol instead of one.
    #[arg(long)]
    compare: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args = Args::parse();
    if args.symbols.is_empty() {
        anyhow::bail!("provide at least one symbol to backtest");
    }

    let settings = Settings::load()?;
    let exchange = BybitClient::new(&settings.exchange);

    let timeframes: Vec<&str> = if args.compare { COMPARE_TIMEFRAMES.to_vec() } else { vec![args.timeframe.as_str()] };

    for symbol in &args.symbols {
        for tf_str in &timeframes {
            let Some(timeframe) = Timeframe::parse(tf_str) else {
                error!(timeframe = tf_str, "skipping unparseable timeframe");
                continue;
            };
            match backtest_one(symbol, tf_str, timeframe, &exchange, &settings).await {
                Ok(()) => {}
                Err(err) => error!(symbol, timeframe = tf_str, error = %err, "backtest failed"),
            }
        }
    }

    Ok(())
}

async fn backtest_one(
    symbol: &str,
    timeframe_str: &str,
    timeframe: Timeframe,
    exchange: &BybitClient,
    settings: &Settings,
) -> anyhow::Result<()> {
    let ticker = exchange
        .get_ticker(symbol)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no ticker for {symbol}"))?;

    let task = BacktestTask {
        scan_id: "cli".to_string(),
        symbol: symbol.to_string(),
        timeframe: timeframe_str.to_string(),
        volatility_24h: ticker.price_change_pct_24h.abs(),
        turnover: ticker.turnover_24h,
        price: ticker.last_price,
        price_change_24h: ticker.price_change_pct_24h,
        timestamp: chrono::Utc::now().timestamp(),
    };

    let result = run_analysis(&task, timeframe, exchange, &settings.trading).await?;
    print_report(symbol, timeframe_str, &result);
    Ok(())
}

fn print_report(symbol: &str, timeframe: &str, result: &omni::types::TimeframeResult) {
    println!(
        "{symbol:<12} {timeframe:>3}m  trades={:<5} win_rate={:>7.2}%  pnl={:>10.2}  avg_win={:>8.2}  avg_loss={:>8.2}  confidence={:>6.2}  strategy={:?}",
        result.total_trades,
        decimal_f64(result.win_rate),
        decimal_f64(result.total_pnl),
        decimal_f64(result.avg_win),
        decimal_f64(result.avg_loss),
        decimal_f64(result.confidence_avg),
        result.best_strategy,
    );
}

fn decimal_f64(value: Decimal) -> f64 {
    use std::str::FromStr;
    f64::from_str(&value.to_string()).unwrap_or(0.0)
}
