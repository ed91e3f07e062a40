//! Persistence layer.
//!
//! Defines the `CacheStore` trait and three interchangeable backends:
//! an in-process bounded map, one JSON file per key, and a SQLite
//! key-value table. All three share the same expiry semantics: an entry
//! past its `expires_at` is absent, never served stale.

pub mod file;
pub mod memory;
pub mod sqlite;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::config::{CacheBackend, CacheConfig};
use crate::types::CostReport;

use self::file::FileStore;
use self::memory::MemoryStore;
use self::sqlite::SqliteStore;

/// Tag written alongside every entry produced by the aggregation engine.
pub const SOURCE_TAG: &str = "aggregate";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A cached report with its lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: CostReport,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub source_tag: String,
}

impl CacheEntry {
    /// Build an entry expiring `ttl` from now. `ttl` must be positive and
    /// the expiry representable.
    pub fn new(key: &str, payload: CostReport, ttl: Duration, source_tag: &str) -> Result<Self> {
        if ttl <= Duration::zero() {
            anyhow::bail!("Cache TTL must be positive, got {ttl}");
        }
        let created_at = Utc::now();
        let expires_at = created_at
            .checked_add_signed(ttl)
            .with_context(|| format!("Cache TTL out of range: {ttl}"))?;
        Ok(Self {
            key: key.to_string(),
            payload,
            created_at,
            expires_at,
            source_tag: source_tag.to_string(),
        })
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    File,
    Sqlite,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::File => write!(f, "file"),
            BackendKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Entries currently held, including expired ones not yet purged.
    pub entry_count: usize,
    pub backend_kind: BackendKind,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Key/value store with per-entry expiry.
///
/// Keys are expected to be normalised with [`normalize_key`] by the caller.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a live entry. Expired entries are removed and reported absent.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Insert or wholly replace the entry for `key`.
    async fn set(&self, key: &str, payload: &CostReport, ttl: Duration) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Drop every expired entry, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize>;

    async fn stats(&self) -> Result<StoreStats>;
}

/// Cache key for a (city, country) pair: trimmed, case-folded, `city|country`.
pub fn normalize_key(city: &str, country: &str) -> String {
    let fold = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    format!("{}|{}", fold(city), fold(country))
}

/// Open the backend selected in configuration.
pub async fn open_store(config: &CacheConfig) -> Result<Arc<dyn CacheStore>> {
    let store: Arc<dyn CacheStore> = match config.backend {
        CacheBackend::Memory => Arc::new(MemoryStore::new(config.max_entries)),
        CacheBackend::File => Arc::new(
            FileStore::open(&config.dir).await
                .with_context(|| format!("Failed to open file cache at {}", config.dir))?,
        ),
        CacheBackend::Sqlite => Arc::new(
            SqliteStore::connect(&config.database_url).await
                .with_context(|| format!("Failed to open sqlite cache at {}", config.database_url))?,
        ),
    };
    info!(backend = ?config.backend, "Cache store opened");
    Ok(store)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
