//! SQLite key-value cache backend.
//!
//! Stands in for an external key-value service: a single `cost_cache`
//! table reachable by any process that can open the database. SQLite has
//! no native per-row expiry, so the expiry timestamp is stored with the
//! row and checked on read, and `purge_expired` deletes in bulk.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::debug;

use super::{BackendKind, CacheEntry, CacheStore, StoreStats, SOURCE_TAG};
use crate::types::CostReport;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS cost_cache (
    key         TEXT PRIMARY KEY,
    payload     TEXT NOT NULL,
    created_at  INTEGER NOT NULL,
    expires_at  INTEGER NOT NULL,
    source_tag  TEXT NOT NULL
)";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and create the table if needed.
    ///
    /// `sqlite::memory:` URLs get a single long-lived connection, since each
    /// in-memory connection is its own database.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let in_memory = database_url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid sqlite URL: {database_url}"))?
            .create_if_missing(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect_with(options)
            .await
            .context("Failed to connect to sqlite cache")?;

        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .context("Failed to create cost_cache table")?;

        debug!(database_url, "SQLite cache ready");
        Ok(Self { pool })
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| anyhow::anyhow!("Invalid timestamp in cache row: {ms}"))
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let row = sqlx::query(
            "SELECT payload, created_at, expires_at, source_tag FROM cost_cache WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to read cache row")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at: i64 = row.try_get("expires_at")?;
        if Utc::now().timestamp_millis() >= expires_at {
            debug!(key, "Cache row expired, deleting");
            self.delete(key).await?;
            return Ok(None);
        }

        let payload: String = row.try_get("payload")?;
        let payload: CostReport = match serde_json::from_str(&payload) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(key, error = %e, "Corrupt cache row, discarding");
                self.delete(key).await?;
                return Ok(None);
            }
        };

        Ok(Some(CacheEntry {
            key: key.to_string(),
            payload,
            created_at: from_millis(row.try_get("created_at")?)?,
            expires_at: from_millis(expires_at)?,
            source_tag: row.try_get("source_tag")?,
        }))
    }

    async fn set(&self, key: &str, payload: &CostReport, ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(key, payload.clone(), ttl, SOURCE_TAG)?;
        let json = serde_json::to_string(&entry.payload)
            .context("Failed to serialise cache payload")?;

        sqlx::query(
            "INSERT OR REPLACE INTO cost_cache (key, payload, created_at, expires_at, source_tag)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&entry.key)
        .bind(json)
        .bind(entry.created_at.timestamp_millis())
        .bind(entry.expires_at.timestamp_millis())
        .bind(&entry.source_tag)
        .execute(&self.pool)
        .await
        .context("Failed to write cache row")?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM cost_cache WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .context("Failed to delete cache row")?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let result = sqlx::query("DELETE FROM cost_cache WHERE expires_at <= ?")
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await
            .context("Failed to purge expired cache rows")?;
        Ok(result.rows_affected() as usize)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cost_cache")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count cache rows")?;
        Ok(StoreStats {
            entry_count: count as usize,
            backend_kind: BackendKind::Sqlite,
        })
    }
}
