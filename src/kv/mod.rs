//! Key-value abstraction over the discovery/scanner coordination keys
//! (spec.md §6.3): `discovery:latest`, `discovery:version`,
//! `scanner:active`, `scanner:{id}:heartbeat`.

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

#[async_trait]
pub trait Kv: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn sadd(&self, key: &str, member: &str) -> Result<()>;
    async fn srem(&self, key: &str, member: &str) -> Result<()>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>>;
    async fn incr(&self, key: &str) -> Result<i64>;
}
