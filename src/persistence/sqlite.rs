//! SQLite-backed shared persistence for the Results/ScanHistory/Positions
//! tables, grounded in the teacher's `db::SQLiteMemory` (`sqlx::SqlitePool`,
//! WAL mode, `CREATE TABLE IF NOT EXISTS`, bind-based queries). Every
//! service process connects to the same `db_path`, so a scan, proposal, or
//! status transition written by one process is visible to every other —
//! unlike the in-memory stores, which are process-local.
//!
//! Each row's full structure is kept as a single JSON blob (`body`); the
//! handful of columns alongside it are exactly the ones a query needs to
//! filter or order by, mirroring the item-store shape spec.md calls
//! "DynamoDB-like" (opaque payload plus queryable key attributes).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use super::{PositionsStore, ResultsStore, ScanHistoryStore};
use crate::error::{PipelineError, Result};
use crate::types::{PositionProposal, PositionStatus, ScanHistory, ScanRecord};

#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    pub db_path: String,
    pub max_connections: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            db_path: "data/omni.db".to_string(),
            max_connections: 5,
        }
    }
}

pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    pub async fn connect(config: &PersistenceConfig) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(&config.db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| PipelineError::Fatal(format!("cannot create {}: {e}", parent.display())))?;
            }
        }

        let url = if config.db_path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", config.db_path)
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&url)
            .await
            .map_err(|e| PipelineError::Fatal(format!("sqlite connect {} failed: {e}", config.db_path)))?;

        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await
            .map_err(|e| PipelineError::Fatal(format!("sqlite WAL pragma failed: {e}")))?;

        Self::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS results (
                symbol TEXT NOT NULL,
                scan_timestamp INTEGER NOT NULL,
                ttl INTEGER NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (symbol, scan_timestamp)
            )",
        )
        .execute(pool)
        .await
        .map_err(|e| PipelineError::Fatal(format!("create results table failed: {e}")))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS scan_history (
                scan_id TEXT NOT NULL,
                scan_timestamp INTEGER NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (scan_id, scan_timestamp)
            )",
        )
        .execute(pool)
        .await
        .map_err(|e| PipelineError::Fatal(format!("create scan_history table failed: {e}")))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS positions (
                symbol TEXT NOT NULL,
                signal_timestamp INTEGER NOT NULL,
                status TEXT NOT NULL,
                ttl INTEGER NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (symbol, signal_timestamp)
            )",
        )
        .execute(pool)
        .await
        .map_err(|e| PipelineError::Fatal(format!("create positions table failed: {e}")))?;

        Ok(())
    }

    /// Exposed for binaries that need to hand the same pool to more than
    /// one store adapter (all three traits are implemented on `Self`).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn decode<T: serde::de::DeserializeOwned>(row: &SqliteRow) -> Result<T> {
    let body: String = row.get("body");
    serde_json::from_str(&body).map_err(|e| PipelineError::Other(e.into()))
}

#[async_trait]
impl ResultsStore for SqlitePersistence {
    async fn put(&self, record: ScanRecord) -> Result<()> {
        let body = serde_json::to_string(&record).map_err(|e| PipelineError::Other(e.into()))?;
        sqlx::query(
            "INSERT INTO results (symbol, scan_timestamp, ttl, body) VALUES (?, ?, ?, ?)
             ON CONFLICT(symbol, scan_timestamp) DO UPDATE SET ttl = excluded.ttl, body = excluded.body",
        )
        .bind(&record.symbol)
        .bind(record.scan_timestamp)
        .bind(record.ttl)
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Other(e.into()))?;
        Ok(())
    }

    async fn get(&self, symbol: &str, scan_timestamp: i64) -> Result<Option<ScanRecord>> {
        let row = sqlx::query("SELECT body FROM results WHERE symbol = ? AND scan_timestamp = ?")
            .bind(symbol)
            .bind(scan_timestamp)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PipelineError::Other(e.into()))?;
        row.map(|r| decode(&r)).transpose()
    }

    async fn latest_for_symbol(&self, symbol: &str) -> Result<Option<ScanRecord>> {
        let row = sqlx::query("SELECT body FROM results WHERE symbol = ? ORDER BY scan_timestamp DESC LIMIT 1")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PipelineError::Other(e.into()))?;
        row.map(|r| decode(&r)).transpose()
    }

    async fn all_active(&self) -> Result<Vec<ScanRecord>> {
        let now = Utc::now().timestamp();
        let rows = sqlx::query("SELECT body FROM results WHERE ttl > ?")
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PipelineError::Other(e.into()))?;
        rows.iter().map(decode).collect()
    }

    async fn all(&self) -> Result<Vec<ScanRecord>> {
        let rows = sqlx::query("SELECT body FROM results")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PipelineError::Other(e.into()))?;
        rows.iter().map(decode).collect()
    }

    async fn delete(&self, symbol: &str, scan_timestamp: i64) -> Result<()> {
        sqlx::query("DELETE FROM results WHERE symbol = ? AND scan_timestamp = ?")
            .bind(symbol)
            .bind(scan_timestamp)
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::Other(e.into()))?;
        Ok(())
    }
}

#[async_trait]
impl ScanHistoryStore for SqlitePersistence {
    async fn put(&self, record: ScanHistory) -> Result<()> {
        let body = serde_json::to_string(&record).map_err(|e| PipelineError::Other(e.into()))?;
        sqlx::query(
            "INSERT INTO scan_history (scan_id, scan_timestamp, body) VALUES (?, ?, ?)
             ON CONFLICT(scan_id, scan_timestamp) DO UPDATE SET body = excluded.body",
        )
        .bind(&record.scan_id)
        .bind(record.scan_timestamp)
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Other(e.into()))?;
        Ok(())
    }

    async fn latest(&self) -> Result<Option<ScanHistory>> {
        let row = sqlx::query("SELECT body FROM scan_history ORDER BY scan_timestamp DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PipelineError::Other(e.into()))?;
        row.map(|r| decode(&r)).transpose()
    }
}

#[async_trait]
impl PositionsStore for SqlitePersistence {
    async fn put(&self, proposal: PositionProposal) -> Result<()> {
        let body = serde_json::to_string(&proposal).map_err(|e| PipelineError::Other(e.into()))?;
        sqlx::query(
            "INSERT INTO positions (symbol, signal_timestamp, status, ttl, body) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(symbol, signal_timestamp) DO UPDATE SET status = excluded.status, ttl = excluded.ttl, body = excluded.body",
        )
        .bind(&proposal.symbol)
        .bind(proposal.signal_timestamp.timestamp())
        .bind(format!("{:?}", proposal.status))
        .bind(proposal.ttl)
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Other(e.into()))?;
        Ok(())
    }

    async fn get(&self, symbol: &str, signal_timestamp: DateTime<Utc>) -> Result<Option<PositionProposal>> {
        let row = sqlx::query("SELECT body FROM positions WHERE symbol = ? AND signal_timestamp = ?")
            .bind(symbol)
            .bind(signal_timestamp.timestamp())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PipelineError::Other(e.into()))?;
        row.map(|r| decode(&r)).transpose()
    }

    async fn active(&self) -> Result<Vec<PositionProposal>> {
        let now = Utc::now().timestamp();
        let rows = sqlx::query("SELECT body FROM positions WHERE status = ? AND ttl > ?")
            .bind(format!("{:?}", PositionStatus::Active))
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PipelineError::Other(e.into()))?;
        rows.iter().map(decode).collect()
    }

    async fn latest_for_symbol(&self, symbol: &str) -> Result<Option<PositionProposal>> {
        let row = sqlx::query("SELECT body FROM positions WHERE symbol = ? ORDER BY signal_timestamp DESC LIMIT 1")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PipelineError::Other(e.into()))?;
        row.map(|r| decode(&r)).transpose()
    }

    async fn update_status(
        &self,
        symbol: &str,
        signal_timestamp: DateTime<Utc>,
        expected: PositionStatus,
        status: PositionStatus,
    ) -> Result<()> {
        let ts = signal_timestamp.timestamp();
        let mut tx = self.pool.begin().await.map_err(|e| PipelineError::Other(e.into()))?;

        let row = sqlx::query("SELECT body FROM positions WHERE symbol = ? AND signal_timestamp = ?")
            .bind(symbol)
            .bind(ts)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| PipelineError::Other(e.into()))?;

        let Some(row) = row else {
            return Err(PipelineError::PersistenceConflict(format!(
                "{symbol} has no position row to transition"
            )));
        };
        let mut proposal: PositionProposal = decode(&row)?;
        if proposal.status != expected {
            return Err(PipelineError::PersistenceConflict(format!(
                "{symbol} expected status {expected:?} but found {:?}",
                proposal.status
            )));
        }
        proposal.status = status;
        let body = serde_json::to_string(&proposal).map_err(|e| PipelineError::Other(e.into()))?;

        let outcome = sqlx::query(
            "UPDATE positions SET status = ?, body = ? WHERE symbol = ? AND signal_timestamp = ? AND status = ?",
        )
        .bind(format!("{status:?}"))
        .bind(body)
        .bind(symbol)
        .bind(ts)
        .bind(format!("{expected:?}"))
        .execute(&mut *tx)
        .await
        .map_err(|e| PipelineError::Other(e.into()))?;

        if outcome.rows_affected() == 0 {
            return Err(PipelineError::PersistenceConflict(format!(
                "{symbol} transitioned concurrently"
            )));
        }
        tx.commit().await.map_err(|e| PipelineError::Other(e.into()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::signal::{DirectionalSignal, FundingInfo, StrategyKind, TrendSnapshot};
    use crate::types::PositionType;
    use rust_decimal_macros::dec;

    async fn test_store() -> SqlitePersistence {
        let config = PersistenceConfig {
            db_path: ":memory:".to_string(),
            max_connections: 1,
        };
        SqlitePersistence::connect(&config).await.unwrap()
    }

    fn sample_proposal(symbol: &str) -> PositionProposal {
        let signal = DirectionalSignal {
            strategy: StrategyKind::BasicLong,
            confidence: dec!(70),
            entry_price: dec!(100),
            stop_loss: dec!(99),
            take_profit: dec!(102),
            expected_profit: dec!(2),
            expected_loss: dec!(1),
            fees: dec!(0.1),
            net_profit: dec!(1.9),
            rsi: dec!(50),
            bb_position: dec!(0.5),
            bb_width: dec!(3),
            timestamp: Utc::now(),
        };
        PositionProposal::from_signal(
            symbol.to_string(),
            PositionType::Long,
            &signal,
            "5".to_string(),
            dec!(100),
            10,
            TrendSnapshot::unknown(),
            TrendSnapshot::unknown(),
            FundingInfo::neutral(),
            Some(dec!(98)),
            Some(dec!(104)),
            "proposal-1".to_string(),
            "scan-1".to_string(),
        )
    }

    #[tokio::test]
    async fn positions_roundtrip_through_sqlite() {
        let store = test_store().await;
        let proposal = sample_proposal("BTCUSDT");
        store.put(proposal.clone()).await.unwrap();
        let fetched = store
            .get("BTCUSDT", proposal.signal_timestamp)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.entry_price, dec!(100));
    }

    #[tokio::test]
    async fn update_status_rejects_stale_expected() {
        let store = test_store().await;
        let proposal = sample_proposal("ETHUSDT");
        let ts = proposal.signal_timestamp;
        store.put(proposal).await.unwrap();

        store
            .update_status("ETHUSDT", ts, PositionStatus::Active, PositionStatus::Executing)
            .await
            .unwrap();

        let err = store
            .update_status("ETHUSDT", ts, PositionStatus::Active, PositionStatus::Executing)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::PersistenceConflict(_)));
    }
}
