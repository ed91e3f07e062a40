//! Shared fixtures for integration tests: scripted sources, a store that
//! always fails, and report builders.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use livecost::data::CostSource;
use livecost::engine::quality;
use livecost::storage::{CacheEntry, CacheStore, StoreStats};
use livecost::types::{Category, CategoryCost, CostBreakdown, CostReport, Provider, ProviderResult};

/// A source that replays a fixed result and counts its calls.
pub struct ScriptedSource {
    provider: Provider,
    result: Option<ProviderResult>,
    delay: std::time::Duration,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn ok(provider: Provider, result: ProviderResult) -> Arc<Self> {
        Arc::new(Self { provider, result: Some(result), delay: std::time::Duration::ZERO, calls: AtomicUsize::new(0) })
    }

    pub fn failing(provider: Provider) -> Arc<Self> {
        Arc::new(Self { provider, result: None, delay: std::time::Duration::ZERO, calls: AtomicUsize::new(0) })
    }

    pub fn slow(provider: Provider, result: ProviderResult, delay: std::time::Duration) -> Arc<Self> {
        Arc::new(Self { provider, result: Some(result), delay, calls: AtomicUsize::new(0) })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CostSource for ScriptedSource {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn fetch(&self, _city: &str, _country: &str) -> Result<ProviderResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.result {
            Some(r) => Ok(r.clone()),
            None => anyhow::bail!("{} unavailable", self.provider),
        }
    }
}

/// Every operation errors, like an unreachable backend.
pub struct BrokenStore;

#[async_trait]
impl CacheStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<CacheEntry>> {
        anyhow::bail!("connection refused")
    }

    async fn set(&self, _key: &str, _payload: &CostReport, _ttl: Duration) -> Result<()> {
        anyhow::bail!("disk full")
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        anyhow::bail!("connection refused")
    }

    async fn purge_expired(&self) -> Result<usize> {
        anyhow::bail!("connection refused")
    }

    async fn stats(&self) -> Result<StoreStats> {
        anyhow::bail!("connection refused")
    }
}

pub fn cost(amount: i64, provider: Provider, confidence: f64) -> CategoryCost {
    CategoryCost::new(Decimal::from(amount), provider, confidence)
}

/// Result covering the given categories with one amount and confidence.
pub fn covering(provider: Provider, categories: &[Category], amount: i64, confidence: f64) -> ProviderResult {
    categories.iter().fold(ProviderResult::empty(), |acc, c| {
        acc.with(*c, cost(amount, provider, confidence))
    })
}

pub fn report(city: &str, country: &str, breakdown: CostBreakdown) -> CostReport {
    CostReport {
        city: city.to_string(),
        country: country.to_string(),
        quality: quality::score(&breakdown),
        breakdown,
        generated_at: Utc::now(),
    }
}

pub fn temp_path(prefix: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("{prefix}_{}", uuid::Uuid::new_v4()));
    p
}
