//! End-to-end behaviour of the cache-aside facade with scripted sources.

mod common;

use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use livecost::data::benchmark::BenchmarkProvider;
use livecost::data::CostSource;
use livecost::engine::{Aggregator, CostService};
use livecost::storage::file::FileStore;
use livecost::storage::memory::MemoryStore;
use livecost::storage::sqlite::SqliteStore;
use livecost::storage::CacheStore;
use livecost::types::{Category, CostError, Provider, QualityGrade, DEFAULT_CONFIDENCE};

use common::{covering, BrokenStore, ScriptedSource};

const TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

fn service(store: Arc<dyn CacheStore>, sources: Vec<Arc<dyn CostSource>>, ttl: Duration) -> CostService {
    CostService::new(store, Aggregator::new(sources, TIMEOUT), ttl)
}

fn memory() -> Arc<dyn CacheStore> {
    Arc::new(MemoryStore::new(100))
}

fn all_failing() -> Vec<Arc<ScriptedSource>> {
    Provider::PRIORITY.iter().map(|p| ScriptedSource::failing(*p)).collect()
}

fn erase(sources: &[Arc<ScriptedSource>]) -> Vec<Arc<dyn CostSource>> {
    sources.iter().map(|s| s.clone() as Arc<dyn CostSource>).collect()
}

#[tokio::test]
async fn test_every_category_present_when_everything_fails() {
    let sources = all_failing();
    let svc = service(memory(), erase(&sources), Duration::days(90));

    for (city, country) in [("Bangkok", "Thailand"), ("Nowhere", "Atlantis"), ("x", "y")] {
        let report = svc.get_cost_data(city, country).await.unwrap();
        for category in Category::ALL {
            let c = report.breakdown.get(category);
            assert!(c.monthly_amount >= Decimal::ZERO);
            assert_eq!(c.source, Provider::Default);
            assert_eq!(c.monthly_amount, category.default_amount());
        }
        assert_eq!(report.breakdown.total.monthly_amount, dec!(1630));
        assert!((report.breakdown.total.confidence - DEFAULT_CONFIDENCE).abs() < 1e-9);
        assert_eq!(report.quality.overall, QualityGrade::Low);
        assert!(report.quality.data_sources.is_empty());
    }
}

#[tokio::test]
async fn test_cached_within_window_without_refetch() {
    let numbeo = ScriptedSource::ok(Provider::Numbeo, covering(Provider::Numbeo, &Category::ALL, 500, 0.8));
    let benchmark = ScriptedSource::ok(Provider::Benchmark, covering(Provider::Benchmark, &Category::ALL, 400, 0.6));
    let svc = service(memory(), vec![numbeo.clone(), benchmark.clone()], Duration::days(90));

    let first = svc.get_cost_data("Lisbon", "Portugal").await.unwrap();
    let second = svc.get_cost_data("lisbon ", " PORTUGAL").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
    assert_eq!(numbeo.calls(), 1);
    assert_eq!(benchmark.calls(), 1);
}

#[tokio::test]
async fn test_priority_is_decided_per_category() {
    let numbeo = ScriptedSource::ok(
        Provider::Numbeo,
        covering(Provider::Numbeo, &[Category::Accommodation, Category::Transport], 700, 0.9),
    );
    let expatistan = ScriptedSource::ok(
        Provider::Expatistan,
        covering(Provider::Expatistan, &[Category::Accommodation, Category::Food], 250, 0.7),
    );
    let benchmark = ScriptedSource::ok(Provider::Benchmark, covering(Provider::Benchmark, &Category::ALL, 100, 0.6));
    let exchange = ScriptedSource::failing(Provider::ExchangeRate);

    // registration order must not matter
    let svc = service(
        memory(),
        vec![exchange, benchmark, expatistan, numbeo],
        Duration::days(90),
    );
    let report = svc.get_cost_data("Madrid", "Spain").await.unwrap();
    let b = &report.breakdown;

    assert_eq!(b.accommodation.source, Provider::Numbeo);
    assert_eq!(b.accommodation.monthly_amount, dec!(700));
    assert_eq!(b.food.source, Provider::Expatistan);
    assert_eq!(b.food.monthly_amount, dec!(250));
    assert_eq!(b.transport.source, Provider::Numbeo);
    assert_eq!(b.coworking.source, Provider::Benchmark);
    assert_eq!(
        report.quality.data_sources,
        vec![Provider::Numbeo, Provider::Expatistan, Provider::Benchmark]
    );
}

#[tokio::test]
async fn test_three_of_four_failing_still_completes() {
    let mut sources = all_failing();
    sources[3] = ScriptedSource::ok(
        Provider::ExchangeRate,
        covering(Provider::ExchangeRate, &[Category::Food, Category::Transport], 90, 0.3),
    );
    let svc = service(memory(), erase(&sources), Duration::days(90));

    let report = svc.get_cost_data("Quito", "Ecuador").await.unwrap();
    assert_eq!(report.breakdown.food.source, Provider::ExchangeRate);
    assert_eq!(report.breakdown.transport.source, Provider::ExchangeRate);
    assert_eq!(report.breakdown.accommodation.source, Provider::Default);
    assert_eq!(report.breakdown.coworking.source, Provider::Default);
    assert!(sources.iter().all(|s| s.calls() == 1));
}

#[tokio::test]
async fn test_expired_entry_triggers_fresh_aggregation() {
    let benchmark = ScriptedSource::ok(Provider::Benchmark, covering(Provider::Benchmark, &Category::ALL, 100, 0.6));
    let svc = service(memory(), vec![benchmark.clone()], Duration::milliseconds(50));

    svc.get_cost_data("Oslo", "Norway").await.unwrap();
    svc.get_cost_data("Oslo", "Norway").await.unwrap();
    assert_eq!(benchmark.calls(), 1);

    tokio::time::sleep(std::time::Duration::from_millis(120)).await;
    svc.get_cost_data("Oslo", "Norway").await.unwrap();
    assert_eq!(benchmark.calls(), 2);
}

#[tokio::test]
async fn test_bangkok_with_benchmark_only() {
    let mut sources: Vec<Arc<dyn CostSource>> = vec![
        ScriptedSource::failing(Provider::Numbeo),
        ScriptedSource::failing(Provider::Expatistan),
        ScriptedSource::failing(Provider::ExchangeRate),
    ];
    sources.push(Arc::new(BenchmarkProvider::new()));
    let svc = service(memory(), sources, Duration::days(90));

    let report = svc.get_cost_data("Bangkok", "Thailand").await.unwrap();
    assert_eq!(report.breakdown.accommodation.monthly_amount, dec!(600));
    assert_eq!(report.breakdown.food.monthly_amount, dec!(300));
    assert!((report.breakdown.total.confidence - 0.6).abs() < 1e-9);
    assert_eq!(report.quality.overall, QualityGrade::Medium);
    assert_eq!(report.quality.data_sources, vec![Provider::Benchmark]);

    let json = serde_json::to_value(&report.quality).unwrap();
    assert_eq!(json["overall"], "medium");
    assert_eq!(json["data_sources"], serde_json::json!(["Benchmark"]));
}

#[tokio::test]
async fn test_empty_input_is_rejected() {
    let sources = all_failing();
    let svc = service(memory(), erase(&sources), Duration::days(90));

    for (city, country) in [("", "Thailand"), ("Bangkok", ""), ("  ", "\t"), ("\n", "Spain")] {
        let err = svc.get_cost_data(city, country).await.unwrap_err();
        assert!(matches!(err, CostError::InvalidInput(_)), "{city:?}/{country:?}");
    }
    assert!(sources.iter().all(|s| s.calls() == 0));
}

#[tokio::test]
async fn test_broken_cache_degrades_to_uncached() {
    let benchmark = ScriptedSource::ok(Provider::Benchmark, covering(Provider::Benchmark, &Category::ALL, 100, 0.6));
    let svc = service(Arc::new(BrokenStore), vec![benchmark.clone()], Duration::days(90));

    let first = svc.get_cost_data("Berlin", "Germany").await.unwrap();
    let second = svc.get_cost_data("Berlin", "Germany").await.unwrap();
    assert_eq!(first.breakdown, second.breakdown);
    assert_eq!(benchmark.calls(), 2);

    // explicit store operations do report the failure
    assert!(matches!(svc.purge_expired().await, Err(CostError::Storage(_))));
    assert!(matches!(svc.invalidate("Berlin", "Germany").await, Err(CostError::Storage(_))));
}

#[tokio::test]
async fn test_concurrent_misses_share_one_aggregation() {
    let slow = ScriptedSource::slow(
        Provider::Numbeo,
        covering(Provider::Numbeo, &Category::ALL, 800, 0.9),
        std::time::Duration::from_millis(150),
    );
    let svc = Arc::new(service(memory(), vec![slow.clone()], Duration::days(90)));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let svc = Arc::clone(&svc);
            // same key, differently spelled
            let city = if i % 2 == 0 { "Tokyo" } else { " TOKYO " };
            tokio::spawn(async move { svc.get_cost_data(city, "Japan").await })
        })
        .collect();

    let mut reports = Vec::new();
    for h in handles {
        reports.push(h.await.unwrap().unwrap());
    }

    assert_eq!(slow.calls(), 1);
    assert!(reports.windows(2).all(|w| w[0].breakdown == w[1].breakdown));
    let stats = svc.stats().await.unwrap();
    assert_eq!(stats.aggregations, 1);
    assert_eq!(stats.hits + stats.misses, 8);
}

#[tokio::test]
async fn test_different_keys_do_not_block_each_other() {
    let slow = ScriptedSource::slow(
        Provider::Numbeo,
        covering(Provider::Numbeo, &Category::ALL, 800, 0.9),
        std::time::Duration::from_millis(200),
    );
    let svc = Arc::new(service(memory(), vec![slow.clone()], Duration::days(90)));

    let started = std::time::Instant::now();
    let a = tokio::spawn({
        let svc = Arc::clone(&svc);
        async move { svc.get_cost_data("Rome", "Italy").await }
    });
    let b = tokio::spawn({
        let svc = Arc::clone(&svc);
        async move { svc.get_cost_data("Milan", "Italy").await }
    });
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert_eq!(slow.calls(), 2);
    assert!(started.elapsed() < std::time::Duration::from_millis(390));
}

#[tokio::test]
async fn test_slow_source_is_cut_off() {
    let stuck = ScriptedSource::slow(
        Provider::Numbeo,
        covering(Provider::Numbeo, &Category::ALL, 999, 0.9),
        std::time::Duration::from_secs(30),
    );
    let benchmark = ScriptedSource::ok(Provider::Benchmark, covering(Provider::Benchmark, &Category::ALL, 100, 0.6));
    let svc = CostService::new(
        memory(),
        Aggregator::new(vec![stuck, benchmark], std::time::Duration::from_millis(100)),
        Duration::days(90),
    );

    let started = std::time::Instant::now();
    let report = svc.get_cost_data("Cairo", "Egypt").await.unwrap();
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
    assert_eq!(report.breakdown.accommodation.source, Provider::Benchmark);
}

#[tokio::test]
async fn test_same_behaviour_on_every_backend() {
    let dir = common::temp_path("livecost_service_file");
    let stores: Vec<Arc<dyn CacheStore>> = vec![
        memory(),
        Arc::new(FileStore::open(&dir).await.unwrap()),
        Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap()),
    ];

    for store in stores {
        let benchmark = ScriptedSource::ok(
            Provider::Benchmark,
            covering(Provider::Benchmark, &Category::ALL, 100, 0.6),
        );
        let svc = service(store, vec![benchmark.clone()], Duration::days(90));

        let first = svc.get_cost_data("Sofia", "Bulgaria").await.unwrap();
        let second = svc.get_cost_data("Sofia", "Bulgaria").await.unwrap();
        assert_eq!(benchmark.calls(), 1);
        assert_eq!(first.breakdown.total.monthly_amount, second.breakdown.total.monthly_amount);
        assert_eq!(second.quality.data_sources, vec![Provider::Benchmark]);

        svc.invalidate("sofia", "bulgaria").await.unwrap();
        svc.get_cost_data("Sofia", "Bulgaria").await.unwrap();
        assert_eq!(benchmark.calls(), 2);
        assert_eq!(svc.stats().await.unwrap().store.entry_count, 1);
    }

    std::fs::remove_dir_all(&dir).unwrap();
}
