//! In-process `Kv` used by tests and by binaries with no Redis configured.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::Kv;
use crate::error::Result;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

#[derive(Default)]
pub struct InMemoryKv {
    strings: Mutex<HashMap<String, Entry>>,
    sets: Mutex<HashMap<String, HashSet<String>>>,
    counters: Mutex<HashMap<String, i64>>,
}

impl InMemoryKv {
    fn live(entry: &Entry) -> bool {
        entry.expires_at.map(|at| Instant::now() < at).unwrap_or(true)
    }
}

#[async_trait]
impl Kv for InMemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut strings = self.strings.lock().unwrap();
        match strings.get(key) {
            Some(entry) if Self::live(entry) => Ok(Some(entry.value.clone())),
            Some(_) => {
                strings.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.strings.lock().unwrap().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.strings.lock().unwrap().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        self.sets
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        if let Some(set) = self.sets.lock().unwrap().get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .sets
            .lock()
            .unwrap()
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut counters = self.counters.lock().unwrap();
        let value = counters.entry(key.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_members_roundtrip() {
        let kv = InMemoryKv::default();
        kv.sadd("scanner:active", "s-1").await.unwrap();
        kv.sadd("scanner:active", "s-2").await.unwrap();
        kv.srem("scanner:active", "s-1").await.unwrap();
        let members = kv.smembers("scanner:active").await.unwrap();
        assert_eq!(members, vec!["s-2".to_string()]);
    }

    #[tokio::test]
    async fn ttl_expiry_drops_value() {
        let kv = InMemoryKv::default();
        kv.set_with_ttl("k", "v", Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(kv.get("k").await.unwrap(), None);
    }
}
