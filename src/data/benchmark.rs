//! Static benchmark provider.
//!
//! Compiled-in monthly budgets for well-known cities, with a per-country
//! multiplier table applied to a global baseline when the city itself is
//! not listed. No network access, so it is always available.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::CostSource;
use crate::types::{Category, CategoryCost, Provider, ProviderResult};

/// Confidence for a direct city match.
const CITY_CONFIDENCE: f64 = 0.6;

/// Confidence for a country-multiplier estimate.
const COUNTRY_CONFIDENCE: f64 = 0.4;

/// Global baseline budget (USD/month) scaled by the country multiplier.
/// Shared with the exchange-rate estimator.
pub const BASELINE: [(Category, Decimal); 4] = [
    (Category::Accommodation, dec!(900)),
    (Category::Food, dec!(400)),
    (Category::Transport, dec!(70)),
    (Category::Coworking, dec!(160)),
];

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

struct CityBenchmark {
    city: &'static str,
    country: &'static str,
    accommodation: Decimal,
    food: Decimal,
    transport: Decimal,
    coworking: Decimal,
}

macro_rules! city {
    ($city:expr, $country:expr, $acc:tt, $food:tt, $transport:tt, $cowork:tt) => {
        CityBenchmark {
            city: $city,
            country: $country,
            accommodation: dec!($acc),
            food: dec!($food),
            transport: dec!($transport),
            coworking: dec!($cowork),
        }
    };
}

const CITIES: &[CityBenchmark] = &[
    city!("bangkok", "thailand", 600, 300, 50, 120),
    city!("chiang mai", "thailand", 400, 250, 40, 90),
    city!("ho chi minh city", "vietnam", 500, 250, 40, 100),
    city!("hanoi", "vietnam", 450, 230, 35, 90),
    city!("da nang", "vietnam", 400, 220, 30, 80),
    city!("kuala lumpur", "malaysia", 550, 280, 40, 110),
    city!("canggu", "indonesia", 700, 300, 60, 130),
    city!("tokyo", "japan", 1200, 500, 100, 250),
    city!("lisbon", "portugal", 1300, 450, 45, 200),
    city!("porto", "portugal", 1000, 400, 40, 170),
    city!("barcelona", "spain", 1300, 450, 50, 220),
    city!("berlin", "germany", 1400, 450, 90, 250),
    city!("budapest", "hungary", 750, 350, 30, 150),
    city!("prague", "czech republic", 950, 380, 25, 180),
    city!("tallinn", "estonia", 850, 380, 30, 170),
    city!("tbilisi", "georgia", 550, 250, 20, 100),
    city!("london", "united kingdom", 2200, 550, 190, 350),
    city!("new york", "united states", 3200, 700, 130, 450),
    city!("mexico city", "mexico", 800, 320, 25, 160),
    city!("playa del carmen", "mexico", 900, 350, 40, 150),
    city!("medellin", "colombia", 600, 280, 35, 110),
    city!("buenos aires", "argentina", 550, 300, 20, 120),
    city!("cape town", "south africa", 750, 330, 60, 140),
    city!("dubai", "united arab emirates", 2000, 550, 100, 350),
];

/// Country price level relative to the global baseline.
const COUNTRY_MULTIPLIERS: &[(&str, Decimal)] = &[
    ("thailand", dec!(0.55)),
    ("vietnam", dec!(0.45)),
    ("malaysia", dec!(0.55)),
    ("indonesia", dec!(0.55)),
    ("philippines", dec!(0.55)),
    ("india", dec!(0.35)),
    ("japan", dec!(1.15)),
    ("portugal", dec!(0.95)),
    ("spain", dec!(1.0)),
    ("france", dec!(1.3)),
    ("germany", dec!(1.25)),
    ("italy", dec!(1.1)),
    ("hungary", dec!(0.7)),
    ("czech republic", dec!(0.85)),
    ("poland", dec!(0.7)),
    ("estonia", dec!(0.85)),
    ("georgia", dec!(0.5)),
    ("turkey", dec!(0.5)),
    ("united kingdom", dec!(1.5)),
    ("united states", dec!(1.8)),
    ("canada", dec!(1.5)),
    ("mexico", dec!(0.7)),
    ("colombia", dec!(0.55)),
    ("argentina", dec!(0.5)),
    ("brazil", dec!(0.6)),
    ("south africa", dec!(0.65)),
    ("united arab emirates", dec!(1.6)),
    ("australia", dec!(1.6)),
];

fn normalise(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct BenchmarkProvider;

impl BenchmarkProvider {
    pub fn new() -> Self {
        Self
    }

    /// Look up a city, falling back to the country multiplier.
    pub fn lookup(city: &str, country: &str) -> ProviderResult {
        let city = normalise(city);
        let country = normalise(country);

        if let Some(b) = CITIES.iter().find(|b| b.city == city && b.country == country) {
            return ProviderResult::empty()
                .with(Category::Accommodation, CategoryCost::new(b.accommodation, Provider::Benchmark, CITY_CONFIDENCE))
                .with(Category::Food, CategoryCost::new(b.food, Provider::Benchmark, CITY_CONFIDENCE))
                .with(Category::Transport, CategoryCost::new(b.transport, Provider::Benchmark, CITY_CONFIDENCE))
                .with(Category::Coworking, CategoryCost::new(b.coworking, Provider::Benchmark, CITY_CONFIDENCE));
        }

        match COUNTRY_MULTIPLIERS.iter().find(|(c, _)| *c == country) {
            Some((_, multiplier)) => scaled_baseline(*multiplier, Provider::Benchmark, COUNTRY_CONFIDENCE),
            None => ProviderResult::empty(),
        }
    }
}

/// The global baseline scaled by a price level.
pub fn scaled_baseline(level: Decimal, source: Provider, confidence: f64) -> ProviderResult {
    BASELINE.iter().fold(ProviderResult::empty(), |acc, (category, amount)| {
        acc.with(*category, CategoryCost::new(*amount * level, source, confidence))
    })
}

#[async_trait]
impl CostSource for BenchmarkProvider {
    fn provider(&self) -> Provider {
        Provider::Benchmark
    }

    async fn fetch(&self, city: &str, country: &str) -> Result<ProviderResult> {
        Ok(Self::lookup(city, country))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
