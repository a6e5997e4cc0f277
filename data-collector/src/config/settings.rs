//! Application settings and configuration

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::schema::EntitySpec;
use collector_common::error::ConfigurationError;

/// Main application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub providers: ProvidersSettings,
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// PostgreSQL connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

fn default_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgresql://localhost/metrics".into())
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    30
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

/// Engine-wide knobs shared by every source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Rows per upsert batch (clamped to 500..=1000 when writing)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Emit a progress line every N completed tasks
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,
    /// Tasks listed by a dry run
    #[serde(default = "default_preview_tasks")]
    pub preview_tasks: usize,
}

fn default_batch_size() -> usize {
    1000
}

fn default_progress_every() -> usize {
    10
}

fn default_preview_tasks() -> usize {
    5
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            progress_every: default_progress_every(),
            preview_tasks: default_preview_tasks(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersSettings {
    #[serde(default)]
    pub artemis: ProviderSettings,
    #[serde(default)]
    pub coingecko: ProviderSettings,
    #[serde(default)]
    pub defillama: ProviderSettings,
    #[serde(default)]
    pub velo: ProviderSettings,
    #[serde(default)]
    pub alphavantage: ProviderSettings,
}

impl ProvidersSettings {
    /// Settings block for a source by its configuration name.
    pub fn get(&self, name: &str) -> Option<&ProviderSettings> {
        match name {
            "artemis" => Some(&self.artemis),
            "coingecko" => Some(&self.coingecko),
            "defillama" => Some(&self.defillama),
            "velo" => Some(&self.velo),
            "alphavantage" => Some(&self.alphavantage),
            _ => None,
        }
    }
}

/// Per-source settings. Unset overrides fall back to the adapter's own
/// rate profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Falls back to the provider's conventional env var when unset
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Subscription tier, e.g. `pro` or `demo` for CoinGecko
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub entities: Vec<EntitySpec>,
    /// Provider entity id -> canonical entity id
    #[serde(default)]
    pub entity_links: HashMap<String, i32>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub requests_per_sec: Option<f64>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub daily_quota: Option<u32>,
}

fn default_true() -> bool {
    true
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            base_url: None,
            plan: None,
            entities: Vec::new(),
            entity_links: HashMap::new(),
            concurrency: None,
            requests_per_sec: None,
            max_attempts: None,
            timeout_secs: None,
            daily_quota: None,
        }
    }
}

impl ProviderSettings {
    /// Configured key, or the value of `env_var`. Blank values count as unset.
    pub fn resolve_api_key(&self, env_var: &str) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(env_var).ok())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    fn validate(&self, name: &str) -> Result<(), ConfigurationError> {
        if matches!(self.concurrency, Some(0)) {
            return Err(ConfigurationError::invalid_value(
                format!("providers.{}.concurrency", name),
                "must be at least 1",
            ));
        }
        if let Some(rate) = self.requests_per_sec {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(ConfigurationError::invalid_value(
                    format!("providers.{}.requests_per_sec", name),
                    "must be a positive number",
                ));
            }
        }
        if matches!(self.max_attempts, Some(0)) {
            return Err(ConfigurationError::invalid_value(
                format!("providers.{}.max_attempts", name),
                "must be at least 1",
            ));
        }
        if matches!(self.daily_quota, Some(0)) {
            return Err(ConfigurationError::invalid_value(
                format!("providers.{}.daily_quota", name),
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Settings {
    /// Load settings from configuration files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_prefix("DATA_COLLECTOR")
    }

    /// Load settings with a custom environment variable prefix
    pub fn load_with_prefix(env_prefix: &str) -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config_dir = Self::config_dir();

        let s = Config::builder()
            .add_source(File::with_name(&format!("{}/default", config_dir)).required(false))
            .add_source(File::with_name(&format!("{}/{}", config_dir, run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(File::with_name(&format!("{}/local", config_dir)).required(false))
            // e.g. DATA_COLLECTOR__DATABASE__URL
            .add_source(
                Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    fn config_dir() -> String {
        std::env::var("DATA_COLLECTOR_CONFIG_DIR").unwrap_or_else(|_| "config".into())
    }

    /// Create default settings (useful for testing)
    pub fn default_settings() -> Self {
        Self::default()
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.engine.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "engine.batch_size",
                "must be at least 1",
            ));
        }
        if self.engine.progress_every == 0 {
            return Err(ConfigurationError::invalid_value(
                "engine.progress_every",
                "must be at least 1",
            ));
        }
        for name in ["artemis", "coingecko", "defillama", "velo", "alphavantage"] {
            if let Some(provider) = self.providers.get(name) {
                provider.validate(name)?;
            }
        }
        Ok(())
    }
}
