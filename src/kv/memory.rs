//! In-process key-value store.
//!
//! Implements the full `KvClient` contract on top of a `DashMap`, so the connection
//! manager and storage layer can run without a remote store. Reachability can be
//! toggled to simulate outages, and every mutating call is counted.

use super::client::{ConnectOptions, KeyValue, KvClient, KvConnector, KvResult};
use super::error::KvError;

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Operation counters of a `MemoryKv`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub gets: u64,
    pub puts: u64,
    pub deletes: u64,
    pub probes: u64,
    pub closes: u64,
}

pub struct MemoryKv {
    data: DashMap<String, String>,
    reachable: AtomicBool,
    gets: AtomicU64,
    puts: AtomicU64,
    deletes: AtomicU64,
    probes: AtomicU64,
    closes: AtomicU64,
}

impl MemoryKv {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// While unreachable every operation, probes included, fails with a transport error.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// Writes a pair without touching the counters.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.data.insert(key.to_string(), value.to_string());
    }

    /// Ordered copy of the whole keyspace.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            gets: self.gets.load(Ordering::SeqCst),
            puts: self.puts.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
            probes: self.probes.load(Ordering::SeqCst),
            closes: self.closes.load(Ordering::SeqCst),
        }
    }

    pub fn reset_stats(&self) {
        for counter in [&self.gets, &self.puts, &self.deletes, &self.probes, &self.closes] {
            counter.store(0, Ordering::SeqCst);
        }
    }

    fn check_reachable(&self) -> KvResult<()> {
        if self.is_reachable() {
            Ok(())
        } else {
            Err(KvError::Transport("memory store is unreachable".to_string()))
        }
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.data
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect()
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self {
            data: DashMap::new(),
            reachable: AtomicBool::new(true),
            gets: AtomicU64::new(0),
            puts: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            probes: AtomicU64::new(0),
            closes: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl KvClient for MemoryKv {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        self.check_reachable()?;
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self.data.get(key).map(|value| value.value().clone()))
    }

    async fn put(&self, key: &str, value: &str) -> KvResult<()> {
        self.check_reachable()?;
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> KvResult<u64> {
        self.check_reachable()?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(self.data.remove(key).map_or(0, |_| 1))
    }

    async fn delete_prefix(&self, prefix: &str) -> KvResult<u64> {
        self.check_reachable()?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let removed = self
            .keys_with_prefix(prefix)
            .into_iter()
            .filter(|key| self.data.remove(key).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn list_prefix(&self, prefix: &str) -> KvResult<Vec<KeyValue>> {
        self.check_reachable()?;
        self.gets.fetch_add(1, Ordering::SeqCst);
        let mut pairs: Vec<KeyValue> = self
            .data
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| KeyValue {
                key: entry.key().clone(),
                value: entry.value().clone(),
            })
            .collect();
        pairs.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(pairs)
    }

    async fn count_prefix(&self, prefix: &str) -> KvResult<u64> {
        self.check_reachable()?;
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self.keys_with_prefix(prefix).len() as u64)
    }

    async fn status(&self, _endpoint: &str) -> KvResult<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out the same shared `MemoryKv` on every connect.
pub struct MemoryConnector {
    store: Arc<MemoryKv>,
    attempts: AtomicU64,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryKv>) -> Arc<Self> {
        Arc::new(Self {
            store,
            attempts: AtomicU64::new(0),
        })
    }

    pub fn store(&self) -> Arc<MemoryKv> {
        self.store.clone()
    }

    /// Number of `connect` calls so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KvConnector for MemoryConnector {
    async fn connect(&self, _options: &ConnectOptions) -> KvResult<Arc<dyn KvClient>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Ok(self.store.clone())
    }
}
