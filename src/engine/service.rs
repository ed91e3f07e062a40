//! Cache-aside facade.
//!
//! `CostService::get_cost_data` is the single entry point the rest of an
//! application uses: read the cache, and on a miss aggregate, score,
//! store with a long TTL and return. Concurrent misses for the same key
//! share one aggregation. The cache is an optimisation only; a broken
//! store degrades to uncached aggregation, never to an error.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::data::build_sources;
use crate::engine::aggregator::Aggregator;
use crate::engine::quality;
use crate::storage::{normalize_key, open_store, CacheStore, StoreStats};
use crate::types::{CostError, CostReport};

/// Cached reports live this long unless configured otherwise.
pub const DEFAULT_TTL_DAYS: i64 = 90;

type FlightTable = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Facade counters plus the backing store's own numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStats {
    pub hits: u64,
    /// Requests whose first cache read missed.
    pub misses: u64,
    /// Aggregations actually run. Lower than `misses` when requests were
    /// coalesced.
    pub aggregations: u64,
    pub store: StoreStats,
}

pub struct CostService {
    store: Arc<dyn CacheStore>,
    aggregator: Aggregator,
    ttl: Duration,
    in_flight: FlightTable,
    hits: AtomicU64,
    misses: AtomicU64,
    aggregations: AtomicU64,
}

impl CostService {
    pub fn new(store: Arc<dyn CacheStore>, aggregator: Aggregator, ttl: Duration) -> Self {
        Self {
            store,
            aggregator,
            ttl,
            in_flight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            aggregations: AtomicU64::new(0),
        }
    }

    /// Build sources, open the configured store and wire them together.
    pub async fn from_config(config: &AppConfig) -> Result<Self, CostError> {
        let (ttl, fetch_timeout) = engine_limits(config)?;

        let sources = build_sources(config).map_err(|e| CostError::Config(format!("{e:#}")))?;
        let store = open_store(&config.cache)
            .await
            .map_err(|e| CostError::Storage(format!("{e:#}")))?;
        let aggregator = Aggregator::new(sources, fetch_timeout);

        info!(
            providers = ?aggregator.providers(),
            backend = ?config.cache.backend,
            ttl_days = config.engine.cache_ttl_days,
            "Cost service ready"
        );
        Ok(Self::new(store, aggregator, ttl))
    }

    // -- Lookups ---------------------------------------------------------

    /// Cost of living for a city, from cache when possible.
    ///
    /// Only empty or whitespace-only input is an error. Provider and cache
    /// failures are absorbed; the worst case is an all-default report
    /// graded `low`.
    pub async fn get_cost_data(&self, city: &str, country: &str) -> Result<CostReport, CostError> {
        let (city, country) = validate(city, country)?;
        let key = normalize_key(city, country);

        if let Some(report) = self.cached(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Cache hit");
            return Ok(report);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        // declared before the lock guard so it is dropped after it, even
        // when this future is cancelled mid-flight
        let landing = Landing { service: self, key: &key, flight: self.flight(&key) };
        let guard = landing.flight.lock().await;

        // another caller may have filled the entry while we waited
        let report = match self.cached(&key).await {
            Some(report) => {
                debug!(key = %key, "Served by concurrent aggregation");
                report
            }
            None => self.refresh(&key, city, country).await,
        };

        drop(guard);
        Ok(report)
    }

    /// Aggregate, score and store. Store failures are logged only.
    async fn refresh(&self, key: &str, city: &str, country: &str) -> CostReport {
        let breakdown = self.aggregator.aggregate(city, country).await;
        self.aggregations.fetch_add(1, Ordering::Relaxed);

        let report = CostReport {
            city: city.to_string(),
            country: country.to_string(),
            quality: quality::score(&breakdown),
            breakdown,
            generated_at: Utc::now(),
        };

        if let Err(e) = self.store.set(key, &report, self.ttl).await {
            warn!(key, error = %e, "Cache write failed, returning uncached result");
        }
        report
    }

    async fn cached(&self, key: &str) -> Option<CostReport> {
        match self.store.get(key).await {
            Ok(entry) => entry.map(|e| e.payload),
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    // -- Single-flight ---------------------------------------------------

    fn flights(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        // the table holds no invariants a panic could break
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn flight(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.flights().entry(key.to_string()).or_default().clone()
    }

    /// Drop the table entry once nobody else holds it.
    fn land(&self, key: &str, flight: &Arc<tokio::sync::Mutex<()>>) {
        let mut table = self.flights();
        // one reference in the table, one held by the caller
        if Arc::strong_count(flight) <= 2 {
            table.remove(key);
        }
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        self.flights().len()
    }

    // -- Maintenance -----------------------------------------------------

    /// Forget the cached report for one city.
    pub async fn invalidate(&self, city: &str, country: &str) -> Result<(), CostError> {
        let (city, country) = validate(city, country)?;
        let key = normalize_key(city, country);
        self.store
            .delete(&key)
            .await
            .map_err(|e| CostError::Storage(format!("{e:#}")))?;
        info!(key = %key, "Cache entry invalidated");
        Ok(())
    }

    pub async fn purge_expired(&self) -> Result<usize, CostError> {
        self.store
            .purge_expired()
            .await
            .map_err(|e| CostError::Storage(format!("{e:#}")))
    }

    pub async fn stats(&self) -> Result<ServiceStats, CostError> {
        let store = self
            .store
            .stats()
            .await
            .map_err(|e| CostError::Storage(format!("{e:#}")))?;
        Ok(ServiceStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            aggregations: self.aggregations.load(Ordering::Relaxed),
            store,
        })
    }

    /// Fraction of lookups answered from cache (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Purge expired entries every `interval` until the handle is aborted.
    pub fn spawn_janitor(self: &Arc<Self>, interval: std::time::Duration) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let interval = interval.max(std::time::Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match service.purge_expired().await {
                    Ok(0) => debug!("Janitor found nothing to purge"),
                    Ok(removed) => info!(removed, "Janitor purged expired cache entries"),
                    Err(e) => warn!(error = %e, "Janitor purge failed"),
                }
            }
        })
    }
}

/// Releases a key's single-flight slot when the lookup ends or is dropped.
struct Landing<'a> {
    service: &'a CostService,
    key: &'a str,
    flight: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for Landing<'_> {
    fn drop(&mut self) {
        self.service.land(self.key, &self.flight);
    }
}

/// Validated cache TTL and per-source timeout.
fn engine_limits(config: &AppConfig) -> Result<(Duration, std::time::Duration), CostError> {
    let engine = &config.engine;
    let ttl = Duration::try_days(engine.cache_ttl_days)
        .filter(|ttl| *ttl > Duration::zero() && Utc::now().checked_add_signed(*ttl).is_some())
        .ok_or_else(|| {
            CostError::Config(format!(
                "engine.cache_ttl_days must be positive and within date range, got {}",
                engine.cache_ttl_days
            ))
        })?;
    if engine.fetch_timeout_secs == 0 {
        return Err(CostError::Config("engine.fetch_timeout_secs must be positive".into()));
    }
    if engine.janitor_interval_secs == 0 {
        return Err(CostError::Config("engine.janitor_interval_secs must be positive".into()));
    }
    Ok((ttl, std::time::Duration::from_secs(engine.fetch_timeout_secs)))
}

fn validate<'a>(city: &'a str, country: &'a str) -> Result<(&'a str, &'a str), CostError> {
    let city = city.trim();
    let country = country.trim();
    if city.is_empty() {
        return Err(CostError::InvalidInput("city must not be empty".into()));
    }
    if country.is_empty() {
        return Err(CostError::InvalidInput("country must not be empty".into()));
    }
    Ok((city, country))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
