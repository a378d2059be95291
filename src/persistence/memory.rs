//! In-memory `ResultsStore`/`ScanHistoryStore`/`PositionsStore`, TTL-aware
//! on read the way a DynamoDB TTL sweep would be (expired rows are filtered
//! out rather than actively evicted).

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{PositionsStore, ResultsStore, ScanHistoryStore};
use crate::error::Result;
use crate::types::{PositionProposal, PositionStatus, ScanHistory, ScanRecord};

#[derive(Default)]
pub struct InMemoryResultsStore {
    rows: RwLock<HashMap<(String, i64), ScanRecord>>,
}

#[async_trait]
impl ResultsStore for InMemoryResultsStore {
    async fn put(&self, record: ScanRecord) -> Result<()> {
        let key = (record.symbol.clone(), record.scan_timestamp);
        self.rows.write().unwrap().insert(key, record);
        Ok(())
    }

    async fn get(&self, symbol: &str, scan_timestamp: i64) -> Result<Option<ScanRecord>> {
        Ok(self.rows.read().unwrap().get(&(symbol.to_string(), scan_timestamp)).cloned())
    }

    async fn latest_for_symbol(&self, symbol: &str) -> Result<Option<ScanRecord>> {
        let rows = self.rows.read().unwrap();
        Ok(rows
            .values()
            .filter(|r| r.symbol == symbol)
            .max_by_key(|r| r.scan_timestamp)
            .cloned())
    }

    async fn all_active(&self) -> Result<Vec<ScanRecord>> {
        let now = Utc::now().timestamp();
        let rows = self.rows.read().unwrap();
        Ok(rows.values().filter(|r| r.ttl > now).cloned().collect())
    }

    async fn all(&self) -> Result<Vec<ScanRecord>> {
        Ok(self.rows.read().unwrap().values().cloned().collect())
    }

    async fn delete(&self, symbol: &str, scan_timestamp: i64) -> Result<()> {
        self.rows.write().unwrap().remove(&(symbol.to_string(), scan_timestamp));
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryScanHistoryStore {
    rows: RwLock<Vec<ScanHistory>>,
}

#[async_trait]
impl ScanHistoryStore for InMemoryScanHistoryStore {
    async fn put(&self, record: ScanHistory) -> Result<()> {
        self.rows.write().unwrap().push(record);
        Ok(())
    }

    async fn latest(&self) -> Result<Option<ScanHistory>> {
        Ok(self
            .rows
            .read()
            .unwrap()
            .iter()
            .max_by_key(|r| r.scan_timestamp)
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryPositionsStore {
    rows: RwLock<HashMap<(String, i64), PositionProposal>>,
}

#[async_trait]
impl PositionsStore for InMemoryPositionsStore {
    async fn put(&self, proposal: PositionProposal) -> Result<()> {
        let key = (proposal.symbol.clone(), proposal.signal_timestamp.timestamp());
        self.rows.write().unwrap().insert(key, proposal);
        Ok(())
    }

    async fn get(&self, symbol: &str, signal_timestamp: chrono::DateTime<Utc>) -> Result<Option<PositionProposal>> {
        let key = (symbol.to_string(), signal_timestamp.timestamp());
        Ok(self.rows.read().unwrap().get(&key).cloned())
    }

    async fn active(&self) -> Result<Vec<PositionProposal>> {
        let now = Utc::now();
        let rows = self.rows.read().unwrap();
        Ok(rows
            .values()
            .filter(|p| p.status == PositionStatus::Active && !p.is_expired(now))
            .cloned()
            .collect())
    }

    async fn latest_for_symbol(&self, symbol: &str) -> Result<Option<PositionProposal>> {
        let rows = self.rows.read().unwrap();
        Ok(rows
            .values()
            .filter(|p| p.symbol == symbol)
            .max_by_key(|p| p.signal_timestamp)
            .cloned())
    }

    async fn update_status(
        &self,
        symbol: &str,
        signal_timestamp: chrono::DateTime<Utc>,
        expected: PositionStatus,
        status: PositionStatus,
    ) -> Result<()> {
        let key = (symbol.to_string(), signal_timestamp.timestamp());
        let mut rows = self.rows.write().unwrap();
        match rows.get_mut(&key) {
            Some(proposal) if proposal.status == expected => {
                proposal.status = status;
                Ok(())
            }
            Some(proposal) => Err(crate::error::PipelineError::PersistenceConflict(format!(
                "{symbol} expected status {expected:?} but found {:?}",
                proposal.status
            ))),
            None => Err(crate::error::PipelineError::PersistenceConflict(format!(
                "{symbol} has no position row to transition"
            ))),
        }
    }
}
