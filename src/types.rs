//! Shared types for the LIVECOST engine.
//!
//! These types form the data model used across all modules. Providers
//! produce [`ProviderResult`]s, the aggregator folds them into a
//! [`CostBreakdown`], the scorer attaches a [`QualityReport`], and the
//! pair travels through the cache as a [`CostReport`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// One of the four tracked cost dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Accommodation,
    Food,
    Transport,
    Coworking,
}

impl Category {
    /// All categories, in merge and reporting order.
    pub const ALL: [Category; 4] = [
        Category::Accommodation,
        Category::Food,
        Category::Transport,
        Category::Coworking,
    ];

    /// Hard-coded monthly amount used when no provider covers this category.
    pub fn default_amount(&self) -> Decimal {
        match self {
            Category::Accommodation => dec!(1000),
            Category::Food => dec!(400),
            Category::Transport => dec!(80),
            Category::Coworking => dec!(150),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Accommodation => write!(f, "accommodation"),
            Category::Food => write!(f, "food"),
            Category::Transport => write!(f, "transport"),
            Category::Coworking => write!(f, "coworking"),
        }
    }
}

/// Origin of a category value.
///
/// The first four variants are fetchers; `Default` marks the hard-coded
/// substitute and never appears in [`Provider::PRIORITY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    Numbeo,
    Expatistan,
    Benchmark,
    ExchangeRate,
    #[serde(rename = "default")]
    Default,
}

impl Provider {
    /// Fixed merge priority, highest first.
    pub const PRIORITY: [Provider; 4] = [
        Provider::Numbeo,
        Provider::Expatistan,
        Provider::Benchmark,
        Provider::ExchangeRate,
    ];

    /// Position in [`Provider::PRIORITY`]; `Default` sorts after every fetcher.
    pub fn rank(&self) -> usize {
        Self::PRIORITY
            .iter()
            .position(|p| p == self)
            .unwrap_or(Self::PRIORITY.len())
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Numbeo => write!(f, "Numbeo"),
            Provider::Expatistan => write!(f, "Expatistan"),
            Provider::Benchmark => write!(f, "Benchmark"),
            Provider::ExchangeRate => write!(f, "ExchangeRate"),
            Provider::Default => write!(f, "default"),
        }
    }
}

/// Coarse data-quality grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityGrade {
    High,
    Medium,
    Low,
}

impl fmt::Display for QualityGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityGrade::High => write!(f, "high"),
            QualityGrade::Medium => write!(f, "medium"),
            QualityGrade::Low => write!(f, "low"),
        }
    }
}

// ---------------------------------------------------------------------------
// Costs
// ---------------------------------------------------------------------------

/// Monthly cost for one category (USD), with its origin and trust score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCost {
    pub monthly_amount: Decimal,
    pub source: Provider,
    /// Estimated trustworthiness, 0.0–1.0
    pub confidence: f64,
}

impl CategoryCost {
    /// Build a value, rounding to cents and clamping confidence into [0, 1].
    pub fn new(monthly_amount: Decimal, source: Provider, confidence: f64) -> Self {
        Self {
            monthly_amount: monthly_amount.round_dp(2),
            source,
            confidence: clamp_confidence(confidence),
        }
    }

    /// The hard-coded substitute for a category nobody covered.
    pub fn fallback(category: Category) -> Self {
        Self::new(category.default_amount(), Provider::Default, DEFAULT_CONFIDENCE)
    }

    /// Whether this value is usable in a merge.
    pub fn has_value(&self) -> bool {
        self.monthly_amount > Decimal::ZERO
    }
}

impl fmt::Display for CategoryCost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "${} ({}, conf={:.2})",
            self.monthly_amount, self.source, self.confidence
        )
    }
}

/// Confidence attached to hard-coded defaults.
pub const DEFAULT_CONFIDENCE: f64 = 0.2;

fn clamp_confidence(c: f64) -> f64 {
    if c.is_nan() {
        0.0
    } else {
        c.clamp(0.0, 1.0)
    }
}

/// Derived sum across all categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostTotal {
    pub monthly_amount: Decimal,
    pub confidence: f64,
}

/// The canonical output unit: every category is always populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub accommodation: CategoryCost,
    pub food: CategoryCost,
    pub transport: CategoryCost,
    pub coworking: CategoryCost,
    pub total: CostTotal,
}

impl CostBreakdown {
    /// Assemble a breakdown from per-category winners and derive `total`.
    ///
    /// The confidence is the unweighted mean of the four categories.
    /// Rent dominates the amount, so a weighted mean is a likely future
    /// refinement; the plain mean is kept for compatibility.
    pub fn from_parts(
        accommodation: CategoryCost,
        food: CategoryCost,
        transport: CategoryCost,
        coworking: CategoryCost,
    ) -> Self {
        let monthly_amount = accommodation.monthly_amount
            + food.monthly_amount
            + transport.monthly_amount
            + coworking.monthly_amount;
        let confidence = (accommodation.confidence
            + food.confidence
            + transport.confidence
            + coworking.confidence)
            / Category::ALL.len() as f64;

        Self {
            accommodation,
            food,
            transport,
            coworking,
            total: CostTotal { monthly_amount, confidence },
        }
    }

    /// A breakdown built purely from defaults.
    pub fn all_defaults() -> Self {
        Self::from_parts(
            CategoryCost::fallback(Category::Accommodation),
            CategoryCost::fallback(Category::Food),
            CategoryCost::fallback(Category::Transport),
            CategoryCost::fallback(Category::Coworking),
        )
    }

    pub fn get(&self, category: Category) -> &CategoryCost {
        match category {
            Category::Accommodation => &self.accommodation,
            Category::Food => &self.food,
            Category::Transport => &self.transport,
            Category::Coworking => &self.coworking,
        }
    }
}

impl fmt::Display for CostBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total ${}/mo (conf={:.2}) | rent {} | food {} | transport {} | coworking {}",
            self.total.monthly_amount,
            self.total.confidence,
            self.accommodation,
            self.food,
            self.transport,
            self.coworking,
        )
    }
}

// ---------------------------------------------------------------------------
// Provider output
// ---------------------------------------------------------------------------

/// Partial breakdown returned by one fetcher. An empty map is the normal
/// "this provider knows nothing about the city" outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderResult {
    pub costs: BTreeMap<Category, CategoryCost>,
}

impl ProviderResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, category: Category, cost: CategoryCost) -> Self {
        self.costs.insert(category, cost);
        self
    }

    pub fn insert(&mut self, category: Category, cost: CategoryCost) {
        self.costs.insert(category, cost);
    }

    /// Value for a category, only if it is usable.
    pub fn value(&self, category: Category) -> Option<&CategoryCost> {
        self.costs.get(&category).filter(|c| c.has_value())
    }

    pub fn is_empty(&self) -> bool {
        !self.costs.values().any(CategoryCost::has_value)
    }
}

// ---------------------------------------------------------------------------
// Quality
// ---------------------------------------------------------------------------

/// Grade and confidence for a single category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryQuality {
    pub category: Category,
    pub source: Provider,
    pub confidence: f64,
    pub grade: QualityGrade,
}

/// Data-quality summary attached to a breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub overall: QualityGrade,
    pub confidence: f64,
    pub categories: Vec<CategoryQuality>,
    /// Providers that won at least one category, in order of first contribution.
    pub data_sources: Vec<Provider>,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// What callers receive and what the cache stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostReport {
    pub city: String,
    pub country: String,
    pub breakdown: CostBreakdown,
    pub quality: QualityReport,
    pub generated_at: DateTime<Utc>,
}

impl fmt::Display for CostReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {} [{}]: {}",
            self.city, self.country, self.quality.overall, self.breakdown
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors surfaced to callers of the engine.
#[derive(Debug, thiserror::Error)]
pub enum CostError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
