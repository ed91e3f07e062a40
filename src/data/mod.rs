//! Cost data providers.
//!
//! Defines the `CostSource` trait and provides the four fetchers:
//! a metered pricing API, a scraped community pricing site, a static
//! benchmark table and an exchange-rate based estimator.

pub mod benchmark;
pub mod exchange;
pub mod expatistan;
pub mod numbeo;
pub mod throttle;

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{AppConfig, SourcesConfig};
use crate::types::{Provider, ProviderResult};

use self::benchmark::BenchmarkProvider;
use self::exchange::ExchangeRateProvider;
use self::expatistan::ExpatistanProvider;
use self::numbeo::NumbeoProvider;

/// User-Agent sent by every HTTP provider.
pub const USER_AGENT: &str = "LIVECOST/0.1.0 (+cost-of-living research)";

/// Abstraction over cost-of-living sources.
///
/// Implementations must return `Ok(ProviderResult::empty())` for a city
/// they do not know; `Err` is reserved for transport or parse failures.
/// Each implementation spaces its own outbound calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CostSource: Send + Sync {
    /// Which provider this source is, for priority ordering.
    fn provider(&self) -> Provider;

    /// Fetch a (possibly partial) monthly breakdown for a city.
    async fn fetch(&self, city: &str, country: &str) -> Result<ProviderResult>;
}

/// Build every enabled source from configuration.
pub fn build_sources(config: &AppConfig) -> Result<Vec<Arc<dyn CostSource>>> {
    let SourcesConfig { numbeo, expatistan, benchmark, exchange } = &config.sources;
    let mut sources: Vec<Arc<dyn CostSource>> = Vec::new();

    if numbeo.enabled {
        let api_key = AppConfig::resolve_env(&numbeo.api_key_env).ok().map(SecretString::new);
        if api_key.is_none() {
            debug!(env = %numbeo.api_key_env, "Numbeo API key not set, provider will return no data");
        }
        sources.push(Arc::new(
            NumbeoProvider::new(
                &numbeo.base_url,
                api_key,
                Duration::from_millis(numbeo.min_interval_ms),
            )
            .context("Failed to initialise Numbeo provider")?,
        ));
    }

    if expatistan.enabled {
        sources.push(Arc::new(
            ExpatistanProvider::new(
                &expatistan.base_url,
                Duration::from_millis(expatistan.min_interval_ms),
            )
            .context("Failed to initialise Expatistan provider")?,
        ));
    }

    if benchmark.enabled {
        sources.push(Arc::new(BenchmarkProvider::new()));
    }

    if exchange.enabled {
        sources.push(Arc::new(
            ExchangeRateProvider::new(
                &exchange.base_url,
                Duration::from_millis(exchange.min_interval_ms),
            )
            .context("Failed to initialise exchange-rate provider")?,
        ));
    }

    info!(
        providers = ?sources.iter().map(|s| s.provider()).collect::<Vec<_>>(),
        "Cost sources initialised"
    );
    Ok(sources)
}
