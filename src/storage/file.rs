//! On-disk cache backend.
//!
//! One JSON document per key, `{key, data, createdAt, expiresAt, sourceTag}`.
//! File names are the sanitised key plus a short FNV hash so two keys that
//! sanitise identically never share a file. Writes go to a temporary file
//! and are renamed into place, so readers never see a partial document.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use super::{BackendKind, CacheEntry, CacheStore, StoreStats, SOURCE_TAG};
use crate::types::CostReport;

const EXTENSION: &str = "json";

/// On-disk document layout.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    key: String,
    data: CostReport,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    source_tag: String,
}

impl From<CacheEntry> for Document {
    fn from(e: CacheEntry) -> Self {
        Self {
            key: e.key,
            data: e.payload,
            created_at: e.created_at,
            expires_at: e.expires_at,
            source_tag: e.source_tag,
        }
    }
}

impl From<Document> for CacheEntry {
    fn from(d: Document) -> Self {
        Self {
            key: d.key,
            payload: d.data,
            created_at: d.created_at,
            expires_at: d.expires_at,
            source_tag: d.source_tag,
        }
    }
}

/// 64-bit FNV-1a, stable across builds.
fn fnv1a(s: &str) -> u64 {
    s.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ b as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

/// Safe file name for a cache key.
pub fn file_name(key: &str) -> String {
    let safe: String = key
        .chars()
        .take(64)
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("{safe}-{:016x}.{EXTENSION}", fnv1a(key))
}

pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a cache directory.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await
            .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(file_name(key))
    }

    async fn read_document(path: &Path) -> Result<ReadOutcome> {
        let json = match fs::read_to_string(path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ReadOutcome::Missing),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };
        match serde_json::from_str(&json) {
            Ok(doc) => Ok(ReadOutcome::Found(doc)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt cache file, discarding");
                Ok(ReadOutcome::Discarded { removed: remove_if_exists(path).await? })
            }
        }
    }

    /// Paths of every cache document in the directory.
    async fn documents(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await
            .with_context(|| format!("Failed to list {}", self.dir.display()))?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) == Some(EXTENSION) {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

enum ReadOutcome {
    Found(Document),
    Missing,
    /// Unparseable; `removed` is false if another process got there first.
    Discarded { removed: bool },
}

/// Delete a file, reporting whether this call removed it.
async fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.path_for(key);
        let ReadOutcome::Found(doc) = Self::read_document(&path).await? else {
            return Ok(None);
        };
        if doc.key != key {
            return Ok(None);
        }
        if Utc::now() >= doc.expires_at {
            debug!(key, "Cache file expired, deleting");
            remove_if_exists(&path).await?;
            return Ok(None);
        }
        Ok(Some(doc.into()))
    }

    async fn set(&self, key: &str, payload: &CostReport, ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(key, payload.clone(), ttl, SOURCE_TAG)?;
        let json = serde_json::to_string_pretty(&Document::from(entry))
            .context("Failed to serialise cache entry")?;

        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        fs::write(&tmp, json).await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("Failed to move cache file into {}", path.display()));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        remove_if_exists(&self.path_for(key)).await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut removed = 0;
        for path in self.documents().await? {
            let gone = match Self::read_document(&path).await? {
                ReadOutcome::Found(doc) if now >= doc.expires_at => remove_if_exists(&path).await?,
                ReadOutcome::Discarded { removed } => removed,
                ReadOutcome::Found(_) | ReadOutcome::Missing => false,
            };
            if gone {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            entry_count: self.documents().await?.len(),
            backend_kind: BackendKind::File,
        })
    }
}
