//! Automated crypto-futures trading pipeline for a single linear-perpetuals
//! venue: Discovery ranks liquid symbols, the Scanner fans them out for
//! backtesting, the Backtest-Analyzer scores every timeframe, the
//! Strategy-Selector promotes scorecards that clear the win-rate/PnL/trade
//! thresholds, the Position-Finder turns a promoted signal into a sized
//! proposal, and the Order-Executor is the only service that ever talks to
//! the exchange's order-entry endpoints.

pub mod broker;
pub mod config;
pub mod entry_engine;
pub mod error;
pub mod exchange;
pub mod indicators;
pub mod kv;
pub mod persistence;
pub mod services;
pub mod simulate;
pub mod trend;
pub mod types;

pub use config::Settings;
pub use error::{PipelineError, Result};
