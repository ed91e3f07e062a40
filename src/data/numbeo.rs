//! Metered pricing API provider.
//!
//! Fetches per-item average prices from the Numbeo city prices API and
//! converts the relevant items into monthly category costs.
//!
//! API: `{base}/api/city_prices?api_key=...&query=City, Country&currency=USD`
//! Auth: API key via `api_key` query param. Paid, metered per call.
//! Coverage: rent, food and transport. No coworking data.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::prelude::*;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::throttle::RateLimiter;
use super::{CostSource, USER_AGENT};
use crate::types::{Category, CategoryCost, Provider, ProviderResult};

// ---------------------------------------------------------------------------
// Item mapping
// ---------------------------------------------------------------------------

struct ItemMapping {
    item_id: u32,
    category: Category,
    /// Multiplier from the item price to a monthly amount.
    monthly_factor: u32,
}

const ITEMS: &[ItemMapping] = &[
    // Apartment (1 bedroom) in City Centre
    ItemMapping { item_id: 26, category: Category::Accommodation, monthly_factor: 1 },
    // Meal, Inexpensive Restaurant (~1.5 meals a day)
    ItemMapping { item_id: 1, category: Category::Food, monthly_factor: 45 },
    // Monthly Pass (Regular Price)
    ItemMapping { item_id: 20, category: Category::Transport, monthly_factor: 1 },
];

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CityPricesResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    prices: Vec<PriceItem>,
}

#[derive(Debug, Deserialize)]
struct PriceItem {
    item_id: u32,
    #[serde(default)]
    average_price: Option<f64>,
    #[serde(default)]
    data_points: u32,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

pub struct NumbeoProvider {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
    limiter: RateLimiter,
}

impl NumbeoProvider {
    pub fn new(base_url: &str, api_key: Option<SecretString>, min_interval: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build Numbeo HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            limiter: RateLimiter::new("numbeo", min_interval),
        })
    }

    /// Confidence grows with the number of user submissions behind a price.
    fn confidence(data_points: u32) -> f64 {
        (0.5 + data_points as f64 / 200.0).min(0.9)
    }

    /// Convert raw price items into category costs.
    fn to_result(prices: &[PriceItem]) -> ProviderResult {
        let mut result = ProviderResult::empty();
        for mapping in ITEMS {
            let Some(item) = prices.iter().find(|p| p.item_id == mapping.item_id) else {
                continue;
            };
            let Some(price) = item.average_price.and_then(Decimal::from_f64) else {
                continue;
            };
            if price <= Decimal::ZERO {
                continue;
            }
            result.insert(
                mapping.category,
                CategoryCost::new(
                    price * Decimal::from(mapping.monthly_factor),
                    Provider::Numbeo,
                    Self::confidence(item.data_points),
                ),
            );
        }
        result
    }
}

#[async_trait]
impl CostSource for NumbeoProvider {
    fn provider(&self) -> Provider {
        Provider::Numbeo
    }

    async fn fetch(&self, city: &str, country: &str) -> Result<ProviderResult> {
        let Some(api_key) = &self.api_key else {
            debug!("No Numbeo API key configured, skipping");
            return Ok(ProviderResult::empty());
        };

        self.limiter.acquire().await;

        let query = format!("{city}, {country}");
        let url = format!(
            "{}/api/city_prices?api_key={}&query={}&currency=USD",
            self.base_url,
            urlencoding::encode(api_key.expose_secret()),
            urlencoding::encode(&query),
        );

        let resp = self.http.get(&url).send().await
            .context(format!("Numbeo request failed for {query}"))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(query = %query, "Numbeo rate limit hit");
            anyhow::bail!("Numbeo rate limited for {query}");
        }
        if !status.is_success() {
            anyhow::bail!("Numbeo API error for {query}: {status}");
        }

        let data: CityPricesResponse = resp.json().await
            .context(format!("Failed to parse Numbeo response for {query}"))?;

        if let Some(err) = data.error {
            debug!(query = %query, error = %err, "Numbeo has no data for city");
            return Ok(ProviderResult::empty());
        }

        let result = Self::to_result(&data.prices);
        debug!(query = %query, categories = result.costs.len(), "Numbeo prices fetched");
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
