//! Redis-backed `Kv`, grounded in the `redis` crate's `ConnectionManager`
//! (auto-reconnecting, cheaply cloneable) — the same shape the wider Rust
//! ecosystem uses for a shared async Redis handle.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

use super::Kv;
use crate::config::KvConfig;
use crate::error::{PipelineError, Result};

pub struct RedisKv {
    manager: ConnectionManager,
}

impl RedisKv {
    pub async fn connect(config: &KvConfig) -> Result<Self> {
        let url = format!("redis://{}:{}", config.host, config.port);
        let client = redis::Client::open(url)
            .map_err(|e| PipelineError::Fatal(format!("invalid redis url: {e}")))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| PipelineError::TransientExchange(format!("redis connect failed: {e}")))?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl Kv for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        conn.get(key)
            .await
            .map_err(|e| PipelineError::TransientExchange(format!("redis GET {key} failed: {e}")))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.set(key, value)
            .await
            .map_err(|e| PipelineError::TransientExchange(format!("redis SET {key} failed: {e}")))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.set_ex(key, value, ttl.as_secs())
            .await
            .map_err(|e| PipelineError::TransientExchange(format!("redis SETEX {key} failed: {e}")))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.sadd(key, member)
            .await
            .map_err(|e| PipelineError::TransientExchange(format!("redis SADD {key} failed: {e}")))
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.srem(key, member)
            .await
            .map_err(|e| PipelineError::TransientExchange(format!("redis SREM {key} failed: {e}")))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.manager.clone();
        conn.smembers(key)
            .await
            .map_err(|e| PipelineError::TransientExchange(format!("redis SMEMBERS {key} failed: {e}")))
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.manager.clone();
        conn.incr(key, 1)
            .await
            .map_err(|e| PipelineError::TransientExchange(format!("redis INCR {key} failed: {e}")))
    }
}
