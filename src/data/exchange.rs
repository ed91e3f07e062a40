//! Exchange-rate based estimator.
//!
//! Last-resort provider. Compares the live market rate of a country's
//! currency against a compiled-in purchasing-power conversion factor to
//! derive a price level, then scales the global baseline budget by it.
//!
//! API: `{base}/latest/USD` (open.er-api.com format)
//! Auth: None required. Read-only.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::*;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use super::benchmark::scaled_baseline;
use super::throttle::RateLimiter;
use super::{CostSource, USER_AGENT};
use crate::types::{Provider, ProviderResult};

const CONFIDENCE: f64 = 0.3;

/// How long a fetched rate table is reused.
const RATES_TTL: Duration = Duration::from_secs(12 * 3600);

const MIN_PRICE_LEVEL: f64 = 0.2;
const MAX_PRICE_LEVEL: f64 = 1.5;

// ---------------------------------------------------------------------------
// Country → currency and PPP factor
// ---------------------------------------------------------------------------

struct CountryCurrency {
    country: &'static str,
    currency: &'static str,
    /// Local currency units per international dollar.
    ppp_factor: f64,
}

const COUNTRIES: &[CountryCurrency] = &[
    CountryCurrency { country: "thailand", currency: "THB", ppp_factor: 12.0 },
    CountryCurrency { country: "vietnam", currency: "VND", ppp_factor: 7500.0 },
    CountryCurrency { country: "malaysia", currency: "MYR", ppp_factor: 1.5 },
    CountryCurrency { country: "indonesia", currency: "IDR", ppp_factor: 4700.0 },
    CountryCurrency { country: "philippines", currency: "PHP", ppp_factor: 19.0 },
    CountryCurrency { country: "india", currency: "INR", ppp_factor: 21.0 },
    CountryCurrency { country: "japan", currency: "JPY", ppp_factor: 95.0 },
    CountryCurrency { country: "portugal", currency: "EUR", ppp_factor: 0.58 },
    CountryCurrency { country: "spain", currency: "EUR", ppp_factor: 0.62 },
    CountryCurrency { country: "france", currency: "EUR", ppp_factor: 0.72 },
    CountryCurrency { country: "germany", currency: "EUR", ppp_factor: 0.74 },
    CountryCurrency { country: "italy", currency: "EUR", ppp_factor: 0.66 },
    CountryCurrency { country: "hungary", currency: "HUF", ppp_factor: 180.0 },
    CountryCurrency { country: "czech republic", currency: "CZK", ppp_factor: 13.5 },
    CountryCurrency { country: "poland", currency: "PLN", ppp_factor: 2.0 },
    CountryCurrency { country: "georgia", currency: "GEL", ppp_factor: 0.95 },
    CountryCurrency { country: "turkey", currency: "TRY", ppp_factor: 9.0 },
    CountryCurrency { country: "united kingdom", currency: "GBP", ppp_factor: 0.67 },
    CountryCurrency { country: "united states", currency: "USD", ppp_factor: 1.0 },
    CountryCurrency { country: "canada", currency: "CAD", ppp_factor: 1.2 },
    CountryCurrency { country: "mexico", currency: "MXN", ppp_factor: 10.0 },
    CountryCurrency { country: "colombia", currency: "COP", ppp_factor: 1400.0 },
    CountryCurrency { country: "brazil", currency: "BRL", ppp_factor: 2.5 },
    CountryCurrency { country: "south africa", currency: "ZAR", ppp_factor: 7.5 },
    CountryCurrency { country: "united arab emirates", currency: "AED", ppp_factor: 2.4 },
    CountryCurrency { country: "australia", currency: "AUD", ppp_factor: 1.45 },
];

fn country_currency(country: &str) -> Option<&'static CountryCurrency> {
    let country = country.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    COUNTRIES.iter().find(|c| c.country == country)
}

/// Price level relative to the baseline; `None` for a non-positive rate.
fn price_level(ppp_factor: f64, market_rate: f64) -> Option<f64> {
    if !market_rate.is_finite() || market_rate <= 0.0 {
        return None;
    }
    Some((ppp_factor / market_rate).clamp(MIN_PRICE_LEVEL, MAX_PRICE_LEVEL))
}

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RatesResponse {
    result: String,
    #[serde(default)]
    rates: HashMap<String, f64>,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

pub struct ExchangeRateProvider {
    http: Client,
    base_url: String,
    limiter: RateLimiter,
    rates: Mutex<Option<(Instant, HashMap<String, f64>)>>,
}

impl ExchangeRateProvider {
    pub fn new(base_url: &str, min_interval: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build exchange-rate HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::new("exchange", min_interval),
            rates: Mutex::new(None),
        })
    }

    /// USD-based rate table, refreshed at most every [`RATES_TTL`].
    async fn usd_rates(&self) -> Result<HashMap<String, f64>> {
        let mut cached = self.rates.lock().await;
        if let Some((fetched_at, rates)) = cached.as_ref() {
            if fetched_at.elapsed() < RATES_TTL {
                return Ok(rates.clone());
            }
        }

        self.limiter.acquire().await;

        let url = format!("{}/latest/USD", self.base_url);
        let resp = self.http.get(&url).send().await
            .context("Exchange-rate request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("Exchange-rate API error: {status}");
        }

        let data: RatesResponse = resp.json().await
            .context("Failed to parse exchange-rate response")?;
        if data.result != "success" {
            anyhow::bail!("Exchange-rate API returned result={}", data.result);
        }

        debug!(currencies = data.rates.len(), "Exchange rates refreshed");
        *cached = Some((Instant::now(), data.rates.clone()));
        Ok(data.rates)
    }
}

#[async_trait]
impl CostSource for ExchangeRateProvider {
    fn provider(&self) -> Provider {
        Provider::ExchangeRate
    }

    async fn fetch(&self, _city: &str, country: &str) -> Result<ProviderResult> {
        let Some(cc) = country_currency(country) else {
            debug!(country, "No currency mapping for country");
            return Ok(ProviderResult::empty());
        };

        let market_rate = if cc.currency == "USD" {
            1.0
        } else {
            match self.usd_rates().await?.get(cc.currency) {
                Some(rate) => *rate,
                None => {
                    debug!(currency = cc.currency, "Currency missing from rate table");
                    return Ok(ProviderResult::empty());
                }
            }
        };

        let Some(level) = price_level(cc.ppp_factor, market_rate).and_then(Decimal::from_f64) else {
            return Ok(ProviderResult::empty());
        };

        debug!(country, currency = cc.currency, market_rate, price_level = %level, "Estimated from exchange rate");
        Ok(scaled_baseline(level, Provider::ExchangeRate, CONFIDENCE))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
