//! Persistence abstraction over the Results/ScanHistory/Positions tables
//! (spec.md §6.1). Production backing is a shared SQLite database (see
//! [`sqlite::SqlitePersistence`]) reachable by every service process, since
//! these tables are exactly where the Scanner, Backtest-Analyzer,
//! Strategy-Selector, Position-Finder, and Order-Executor coordinate across
//! process boundaries (spec.md §5, invariants I4-I6). The in-memory
//! implementation in [`memory`] remains for unit tests and as an explicit
//! opt-out for single-process runs.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{PositionProposal, ScanHistory, ScanRecord};

#[async_trait]
pub trait ResultsStore: Send + Sync {
    async fn put(&self, record: ScanRecord) -> Result<()>;
    async fn get(&self, symbol: &str, scan_timestamp: i64) -> Result<Option<ScanRecord>>;
    async fn latest_for_symbol(&self, symbol: &str) -> Result<Option<ScanRecord>>;
    async fn all_active(&self) -> Result<Vec<ScanRecord>>;
    /// Every row regardless of TTL/status, for the Scanner's GC pass (I6).
    async fn all(&self) -> Result<Vec<ScanRecord>>;
    async fn delete(&self, symbol: &str, scan_timestamp: i64) -> Result<()>;
}

#[async_trait]
pub trait ScanHistoryStore: Send + Sync {
    async fn put(&self, record: ScanHistory) -> Result<()>;
    async fn latest(&self) -> Result<Option<ScanHistory>>;
}

#[async_trait]
pub trait PositionsStore: Send + Sync {
    async fn put(&self, proposal: PositionProposal) -> Result<()>;
    async fn get(&self, symbol: &str, signal_timestamp: chrono::DateTime<chrono::Utc>) -> Result<Option<PositionProposal>>;
    async fn active(&self) -> Result<Vec<PositionProposal>>;
    /// Most recent row for a symbol regardless of status, for the
    /// Finder's dedupe check (spec.md §4.5).
    async fn latest_for_symbol(&self, symbol: &str) -> Result<Option<PositionProposal>>;
    /// Conditional status transition (spec.md §5: "update only if current
    /// status = `expected`"). Returns `PersistenceConflict` if the row is
    /// missing or its status no longer matches `expected`, so two racing
    /// callers can never both believe they won the transition.
    async fn update_status(
        &self,
        symbol: &str,
        signal_timestamp: chrono::DateTime<chrono::Utc>,
        expected: crate::types::PositionStatus,
        status: crate::types::PositionStatus,
    ) -> Result<()>;
}
