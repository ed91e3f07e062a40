//! LIVECOST: cost-of-living aggregation engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the configured cache and runs one command:
//!
//! ```text
//! livecost <city> <country>   print the cost report as JSON
//! livecost purge              drop expired cache entries
//! livecost stats              print cache statistics
//! livecost watch              purge expired entries on a timer until Ctrl+C
//! ```

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use livecost::config::AppConfig;
use livecost::engine::CostService;

const USAGE: &str = "usage: livecost <city> <country> | livecost purge | livecost stats | livecost watch";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let config_path = std::env::var("LIVECOST_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = AppConfig::load_or_default(&config_path)?;
    info!(
        config = %config_path,
        backend = ?cfg.cache.backend,
        ttl_days = cfg.engine.cache_ttl_days,
        "LIVECOST starting up"
    );

    let args: Vec<String> = std::env::args().skip(1).collect();
    let service = Arc::new(CostService::from_config(&cfg).await?);

    match args.as_slice() {
        [cmd] if cmd == "purge" => {
            let removed = service.purge_expired().await?;
            info!(removed, "Purge complete");
            println!("{removed}");
        }
        [cmd] if cmd == "stats" => {
            let stats = service.stats().await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&stats.store).context("Failed to serialise stats")?
            );
        }
        [cmd] if cmd == "watch" => {
            let interval = Duration::from_secs(cfg.engine.janitor_interval_secs);
            let janitor = service.spawn_janitor(interval);
            info!(
                interval_secs = cfg.engine.janitor_interval_secs,
                "Janitor running. Press Ctrl+C to stop."
            );

            tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;
            info!("Shutdown signal received.");
            janitor.abort();

            let stats = service.stats().await?;
            info!(entries = stats.store.entry_count, "LIVECOST shut down cleanly.");
        }
        [city, country] => {
            let report = service.get_cost_data(city, country).await?;
            info!(
                city = %report.city,
                country = %report.country,
                total = %report.breakdown.total.monthly_amount,
                quality = %report.quality.overall,
                "Report ready"
            );
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialise report")?
            );
        }
        _ => anyhow::bail!(USAGE),
    }

    Ok(())
}

/// Initialise the `tracing` subscriber. Logs go to stderr so stdout stays
/// machine-readable.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("livecost=info"));

    let json_logging = std::env::var("LIVECOST_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
