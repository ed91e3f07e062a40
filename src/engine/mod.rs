//! Core engine: fan-out aggregation, quality scoring and the cache-aside
//! facade that ties them to a store.

pub mod aggregator;
pub mod quality;
pub mod service;

pub use self::aggregator::Aggregator;
pub use self::service::{CostService, ServiceStats};
