//! Data-quality scoring.
//!
//! Pure function of a finished breakdown: grades each category and the
//! total by confidence, and lists which providers won categories.

use crate::types::{Category, CategoryQuality, CostBreakdown, Provider, QualityGrade, QualityReport};

/// Lower bound (inclusive) for a `high` grade.
pub const HIGH_THRESHOLD: f64 = 0.7;

/// Lower bound (inclusive) for a `medium` grade.
pub const MEDIUM_THRESHOLD: f64 = 0.5;

/// Slack so a mean that is mathematically on a boundary grades upward.
const EPSILON: f64 = 1e-9;

/// Map a confidence to a grade.
pub fn grade(confidence: f64) -> QualityGrade {
    if confidence + EPSILON >= HIGH_THRESHOLD {
        QualityGrade::High
    } else if confidence + EPSILON >= MEDIUM_THRESHOLD {
        QualityGrade::Medium
    } else {
        QualityGrade::Low
    }
}

/// Score a breakdown.
pub fn score(breakdown: &CostBreakdown) -> QualityReport {
    let categories: Vec<CategoryQuality> = Category::ALL
        .iter()
        .map(|&category| {
            let cost = breakdown.get(category);
            CategoryQuality {
                category,
                source: cost.source,
                confidence: cost.confidence,
                grade: grade(cost.confidence),
            }
        })
        .collect();

    let mut data_sources: Vec<Provider> = Vec::new();
    for q in &categories {
        if q.source != Provider::Default && !data_sources.contains(&q.source) {
            data_sources.push(q.source);
        }
    }

    QualityReport {
        overall: grade(breakdown.total.confidence),
        confidence: breakdown.total.confidence,
        categories,
        data_sources,
    }
}
