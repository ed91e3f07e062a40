//! Multi-source aggregation.
//!
//! Fans out one request per configured source, waits for every source to
//! settle (success, error or timeout), then merges category by category
//! in fixed provider priority. A provider can win rent while another
//! wins food; categories nobody covers fall back to hard-coded defaults.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::data::CostSource;
use crate::types::{Category, CategoryCost, CostBreakdown, Provider, ProviderResult};

/// Terminal state of one source for one aggregation.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success(ProviderResult),
    Failed(String),
    TimedOut,
}

impl FetchOutcome {
    fn result(&self) -> Option<&ProviderResult> {
        match self {
            FetchOutcome::Success(r) => Some(r),
            _ => None,
        }
    }
}

pub struct Aggregator {
    /// Sorted by provider priority.
    sources: Vec<Arc<dyn CostSource>>,
    timeout: Duration,
}

impl Aggregator {
    pub fn new(mut sources: Vec<Arc<dyn CostSource>>, timeout: Duration) -> Self {
        sources.sort_by_key(|s| s.provider().rank());
        Self { sources, timeout }
    }

    pub fn providers(&self) -> Vec<Provider> {
        self.sources.iter().map(|s| s.provider()).collect()
    }

    /// Query every source concurrently and collect each terminal outcome,
    /// in priority order.
    pub async fn fetch_all(&self, city: &str, country: &str) -> Vec<(Provider, FetchOutcome)> {
        let calls = self.sources.iter().map(|source| {
            let provider = source.provider();
            async move {
                let outcome = match tokio::time::timeout(self.timeout, source.fetch(city, country)).await {
                    Ok(Ok(result)) => {
                        debug!(%provider, categories = result.costs.len(), "Source returned");
                        FetchOutcome::Success(result)
                    }
                    Ok(Err(e)) => {
                        warn!(%provider, error = %e, "Source failed, continuing without");
                        FetchOutcome::Failed(format!("{e:#}"))
                    }
                    Err(_) => {
                        warn!(%provider, timeout_ms = self.timeout.as_millis() as u64, "Source timed out, continuing without");
                        FetchOutcome::TimedOut
                    }
                };
                (provider, outcome)
            }
        });
        join_all(calls).await
    }

    /// Build a complete breakdown for a city.
    pub async fn aggregate(&self, city: &str, country: &str) -> CostBreakdown {
        let outcomes = self.fetch_all(city, country).await;
        let succeeded = outcomes.iter().filter(|(_, o)| o.result().is_some()).count();

        let breakdown = merge(&outcomes);
        info!(
            city,
            country,
            sources = outcomes.len(),
            succeeded,
            total = %breakdown.total.monthly_amount,
            confidence = breakdown.total.confidence,
            "Aggregation complete"
        );
        breakdown
    }
}

/// First usable value for `category`, walking outcomes in priority order.
fn pick(outcomes: &[(Provider, FetchOutcome)], category: Category) -> CategoryCost {
    outcomes
        .iter()
        .find_map(|(provider, outcome)| {
            let cost = outcome.result()?.value(category)?;
            Some(CategoryCost { source: *provider, ..cost.clone() })
        })
        .unwrap_or_else(|| CategoryCost::fallback(category))
}

/// Merge outcomes per category. Outcomes are re-sorted by priority, so the
/// result never depends on the order sources finished in.
pub fn merge(outcomes: &[(Provider, FetchOutcome)]) -> CostBreakdown {
    let mut ordered: Vec<(Provider, FetchOutcome)> = outcomes.to_vec();
    ordered.sort_by_key(|(p, _)| p.rank());

    CostBreakdown::from_parts(
        pick(&ordered, Category::Accommodation),
        pick(&ordered, Category::Food),
        pick(&ordered, Category::Transport),
        pick(&ordered, Category::Coworking),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
