//! In-process cache backend.
//!
//! A bounded map with insertion-order eviction: when a new key would
//! exceed `max_entries`, the oldest inserted key is dropped. Replacing an
//! existing key keeps its original position.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::debug;

use super::{BackendKind, CacheEntry, CacheStore, StoreStats, SOURCE_TAG};
use crate::types::CostReport;

#[derive(Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
}

impl Inner {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.order.retain(|k| k != key);
        }
        removed
    }
}

pub struct MemoryStore {
    max_entries: usize,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// `max_entries` of zero is treated as one.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow::anyhow!("Memory cache lock poisoned"))
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let mut inner = self.lock()?;
        let expired = match inner.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => return Ok(None),
        };
        if expired {
            inner.remove(key);
            return Ok(None);
        }
        Ok(inner.entries.get(key).cloned())
    }

    async fn set(&self, key: &str, payload: &CostReport, ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(key, payload.clone(), ttl, SOURCE_TAG)?;
        let mut inner = self.lock()?;

        if inner.entries.insert(key.to_string(), entry).is_none() {
            inner.order.push_back(key.to_string());
        }

        while inner.entries.len() > self.max_entries {
            let Some(oldest) = inner.order.pop_front() else { break };
            inner.entries.remove(&oldest);
            debug!(key = %oldest, "Evicted oldest cache entry");
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let mut inner = self.lock()?;
        let now = Utc::now();
        let before = inner.entries.len();
        inner.entries.retain(|_, e| now < e.expires_at);
        let Inner { entries, order } = &mut *inner;
        order.retain(|k| entries.contains_key(k));
        Ok(before - inner.entries.len())
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            entry_count: self.lock()?.entries.len(),
            backend_kind: BackendKind::Memory,
        })
    }
}
