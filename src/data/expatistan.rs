//! Scraped community pricing provider.
//!
//! Fetches the Expatistan city page and pulls a handful of line items out
//! of its price table. The site is scraped politely: a fixed User-Agent
//! and at least two seconds between requests.
//!
//! Page: `{base}/cost-of-living/{slug}?currency=USD`
//! Auth: None. A 404 means the city is not listed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use super::throttle::RateLimiter;
use super::{CostSource, USER_AGENT};
use crate::types::{Category, CategoryCost, Provider, ProviderResult};

/// The site asks for at least this much spacing between requests.
pub const MIN_SCRAPE_INTERVAL: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Row matching
// ---------------------------------------------------------------------------

struct RowRule {
    /// All keywords must appear in the (lower-cased) row text.
    keywords: &'static [&'static str],
    category: Category,
    monthly_factor: u32,
    confidence: f64,
}

const ROWS: &[RowRule] = &[
    RowRule { keywords: &["monthly rent", "furnished"], category: Category::Accommodation, monthly_factor: 1, confidence: 0.75 },
    RowRule { keywords: &["basic lunch"], category: Category::Food, monthly_factor: 30, confidence: 0.7 },
    RowRule { keywords: &["monthly", "public transport"], category: Category::Transport, monthly_factor: 1, confidence: 0.7 },
    RowRule { keywords: &["coworking"], category: Category::Coworking, monthly_factor: 1, confidence: 0.7 },
];

/// Compiled patterns for pulling prices out of a city page.
pub struct PageParser {
    row: Regex,
    tag: Regex,
    price: Regex,
}

impl PageParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            row: Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").context("Invalid row pattern")?,
            tag: Regex::new(r"<[^>]+>").context("Invalid tag pattern")?,
            price: Regex::new(r"\$\s?([0-9][0-9,]*(?:\.[0-9]+)?)").context("Invalid price pattern")?,
        })
    }

    /// Visible text of each table row, lower-cased with collapsed whitespace.
    fn table_rows(&self, html: &str) -> Vec<String> {
        self.row
            .captures_iter(html)
            .map(|cap| {
                let text = self.tag.replace_all(&cap[1], " ");
                text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
            })
            .collect()
    }

    /// First dollar amount in a piece of text.
    fn first_price(&self, text: &str) -> Option<Decimal> {
        let cap = self.price.captures(text)?;
        Decimal::from_str(&cap[1].replace(',', "")).ok()
    }

    /// Extract category costs from a city page.
    pub fn parse(&self, html: &str) -> ProviderResult {
        let rows = self.table_rows(html);
        let mut result = ProviderResult::empty();

        for rule in ROWS {
            let price = rows
                .iter()
                .filter(|row| rule.keywords.iter().all(|kw| row.contains(kw)))
                .find_map(|row| self.first_price(row));
            if let Some(price) = price.filter(|p| *p > Decimal::ZERO) {
                result.insert(
                    rule.category,
                    CategoryCost::new(
                        price * Decimal::from(rule.monthly_factor),
                        Provider::Expatistan,
                        rule.confidence,
                    ),
                );
            }
        }
        result
    }
}

/// URL slug for a city name ("Ho Chi Minh City" → "ho-chi-minh-city").
pub fn city_slug(city: &str) -> String {
    city.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

pub struct ExpatistanProvider {
    http: Client,
    base_url: String,
    parser: PageParser,
    limiter: RateLimiter,
}

impl ExpatistanProvider {
    /// `min_interval` is raised to [`MIN_SCRAPE_INTERVAL`] if lower.
    pub fn new(base_url: &str, min_interval: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build Expatistan HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            parser: PageParser::new()?,
            limiter: RateLimiter::new("expatistan", min_interval.max(MIN_SCRAPE_INTERVAL)),
        })
    }
}

#[async_trait]
impl CostSource for ExpatistanProvider {
    fn provider(&self) -> Provider {
        Provider::Expatistan
    }

    async fn fetch(&self, city: &str, _country: &str) -> Result<ProviderResult> {
        let slug = city_slug(city);
        if slug.is_empty() {
            return Ok(ProviderResult::empty());
        }

        self.limiter.acquire().await;

        let url = format!("{}/cost-of-living/{}?currency=USD", self.base_url, urlencoding::encode(&slug));
        let resp = self.http.get(&url).send().await
            .context(format!("Expatistan request failed for {slug}"))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            debug!(slug = %slug, "City not listed on Expatistan");
            return Ok(ProviderResult::empty());
        }
        if !status.is_success() {
            anyhow::bail!("Expatistan error for {slug}: {status}");
        }

        let html = resp.text().await
            .context(format!("Failed to read Expatistan page for {slug}"))?;

        let result = self.parser.parse(&html);
        debug!(slug = %slug, categories = result.costs.len(), "Expatistan page scraped");
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use rust_decimal_macros::dec;

    const PAGE: &str = r#"
        <table class="comparison">
          <tr class="price-row">
            <td class="item-name">Basic lunchtime menu (including a drink) in the business district</td>
            <td class="price city-1">$4</td>
          </tr>
          <tr class="price-row">
            <td class="item-name">
              <a href="/x">Monthly rent for 85 m2 (900 sqft) furnished accommodation in NORMAL area</a>
            </td>
            <td class="price city-1">$1,050.50</td>
          </tr>
          <tr class="price-row">
            <td class="item-name">Monthly ticket public transport</td>
            <td class="price city-1">$ 38</td>
          </tr>
          <tr><td>Movie ticket</td><td>$7</td></tr>
        </table>
    "#;

    #[test]
    fn test_city_slug() {
        assert_eq!(city_slug("Ho Chi Minh City"), "ho-chi-minh-city");
        assert_eq!(city_slug("  Lisbon "), "lisbon");
        assert_eq!(city_slug("   "), "");
    }

    #[test]
    fn test_first_price() {
        let parser = PageParser::new().unwrap();
        assert_eq!(parser.first_price("rent $1,234.50 per month"), Some(dec!(1234.50)));
        assert_eq!(parser.first_price("no price here"), None);
    }

    #[test]
    fn test_parse_page() {
        let r = PageParser::new().unwrap().parse(PAGE);
        assert_eq!(r.value(Category::Accommodation).unwrap().monthly_amount, dec!(1050.50));
        assert_eq!(r.value(Category::Food).unwrap().monthly_amount, dec!(120));
        assert_eq!(r.value(Category::Transport).unwrap().monthly_amount, dec!(38));
        assert!(r.value(Category::Coworking).is_none());
        assert_eq!(r.value(Category::Food).unwrap().source, Provider::Expatistan);
    }

    #[test]
    fn test_parse_page_without_table() {
        let parser = PageParser::new().unwrap();
        assert!(parser.parse("<html><body>Nothing to see</body></html>").is_empty());
    }

    #[tokio::test]
    async fn test_fetch_sends_user_agent() {
        let server = MockServer::start_async().await;
        let mock = server.mock_async(|when, then| {
            when.method(GET)
                .path("/cost-of-living/chiang-mai")
                .query_param("currency", "USD")
                .header("user-agent", USER_AGENT);
            then.status(200).body(PAGE);
        }).await;

        let p = ExpatistanProvider::new(&server.base_url(), Duration::from_millis(0)).unwrap();
        let r = p.fetch("Chiang Mai", "Thailand").await.unwrap();
        mock.assert_async().await;
        assert!(!r.is_empty());
    }

    #[tokio::test]
    async fn test_not_found_is_empty() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(GET).path("/cost-of-living/atlantis");
            then.status(404);
        }).await;

        let p = ExpatistanProvider::new(&server.base_url(), Duration::from_millis(0)).unwrap();
        assert!(p.fetch("Atlantis", "Nowhere").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_error_is_error() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(GET).path("/cost-of-living/lisbon");
            then.status(503);
        }).await;

        let p = ExpatistanProvider::new(&server.base_url(), Duration::from_millis(0)).unwrap();
        assert!(p.fetch("Lisbon", "Portugal").await.is_err());
    }

    #[test]
    fn test_min_interval_is_floored() {
        let p = ExpatistanProvider::new("http://localhost", Duration::from_millis(10)).unwrap();
        assert_eq!(p.limiter.min_interval(), MIN_SCRAPE_INTERVAL);

        let p = ExpatistanProvider::new("http://localhost", Duration::from_secs(5)).unwrap();
        assert_eq!(p.limiter.min_interval(), Duration::from_secs(5));
    }
}
