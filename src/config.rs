//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`. Every field has a default so
//! a missing file or a partial file is still a valid configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub cache: CacheConfig,
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on a single provider call.
    pub fetch_timeout_secs: u64,
    pub cache_ttl_days: i64,
    /// How often the background janitor purges expired entries.
    pub janitor_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 10,
            cache_ttl_days: 90,
            janitor_interval_secs: 3600,
        }
    }
}

/// Which cache backend to open.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    File,
    Sqlite,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Bound for the memory backend.
    pub max_entries: usize,
    /// Directory for the file backend.
    pub dir: String,
    /// Connection string for the sqlite backend.
    pub database_url: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::File,
            max_entries: 500,
            dir: ".livecost-cache".to_string(),
            database_url: "sqlite:livecost.db".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SourcesConfig {
    pub numbeo: NumbeoConfig,
    pub expatistan: ExpatistanConfig,
    pub benchmark: BenchmarkConfig,
    pub exchange: ExchangeConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NumbeoConfig {
    pub enabled: bool,
    pub api_key_env: String,
    pub base_url: String,
    pub min_interval_ms: u64,
}

impl Default for NumbeoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key_env: "NUMBEO_API_KEY".to_string(),
            base_url: "https://www.numbeo.com".to_string(),
            min_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExpatistanConfig {
    pub enabled: bool,
    pub base_url: String,
    pub min_interval_ms: u64,
}

impl Default for ExpatistanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://www.expatistan.com".to_string(),
            min_interval_ms: 2000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BenchmarkConfig {
    pub enabled: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExchangeConfig {
    pub enabled: bool,
    pub base_url: String,
    pub min_interval_ms: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://open.er-api.com/v6".to_string(),
            min_interval_ms: 1000,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Load from `path` if it exists, otherwise return defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from a TOML string.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
