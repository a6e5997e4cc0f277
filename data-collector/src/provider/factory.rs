//! Adapter factory
//!
//! Builds the adapter for a source from its settings block: resolves the API
//! key (settings first, then the provider's env var), applies base URL and
//! rate profile overrides.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::alphavantage::AlphaVantageAdapter;
use super::artemis::ArtemisAdapter;
use super::coingecko::{CoinGeckoAdapter, CoinGeckoPlan};
use super::defillama::DefiLlamaAdapter;
use super::velo::VeloAdapter;
use super::{RateProfile, SourceAdapter, WindowQuota};
use crate::config::ProviderSettings;
use collector_common::error::ConfigurationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    AlphaVantage,
    CoinGecko,
    Artemis,
    DefiLlama,
    Velo,
}

impl SourceKind {
    /// Order used when running every source.
    pub const RUN_ORDER: [SourceKind; 5] = [
        SourceKind::AlphaVantage,
        SourceKind::CoinGecko,
        SourceKind::Artemis,
        SourceKind::DefiLlama,
        SourceKind::Velo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::AlphaVantage => "alphavantage",
            SourceKind::CoinGecko => "coingecko",
            SourceKind::Artemis => "artemis",
            SourceKind::DefiLlama => "defillama",
            SourceKind::Velo => "velo",
        }
    }

    pub fn api_key_env(&self) -> &'static str {
        match self {
            SourceKind::AlphaVantage => "ALPHAVANTAGE_API_KEY",
            SourceKind::CoinGecko => "COINGECKO_API_KEY",
            SourceKind::Artemis => "ARTEMIS_API_KEY",
            SourceKind::DefiLlama => "DEFILLAMA_API_KEY",
            SourceKind::Velo => "VELO_API_KEY",
        }
    }

    fn requires_api_key(&self) -> bool {
        !matches!(self, SourceKind::CoinGecko | SourceKind::DefiLlama)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "alphavantage" => Ok(SourceKind::AlphaVantage),
            "coingecko" => Ok(SourceKind::CoinGecko),
            "artemis" => Ok(SourceKind::Artemis),
            "defillama" => Ok(SourceKind::DefiLlama),
            "velo" => Ok(SourceKind::Velo),
            _ => Err(ConfigurationError::invalid_value(
                "source",
                format!("unknown source '{}'", s),
            )),
        }
    }
}

/// Build the adapter for `kind` from its settings.
pub fn build_adapter(
    kind: SourceKind,
    settings: &ProviderSettings,
) -> Result<Arc<dyn SourceAdapter>, ConfigurationError> {
    let key = settings.resolve_api_key(kind.api_key_env());
    if kind.requires_api_key() && key.is_none() {
        return Err(ConfigurationError::EnvVarMissing(kind.api_key_env().to_string()));
    }
    let required_key = || key.clone().unwrap_or_default();

    let adapter: Arc<dyn SourceAdapter> = match kind {
        SourceKind::Artemis => {
            let mut adapter = ArtemisAdapter::new(required_key())
                .with_rate_profile(tuned(ArtemisAdapter::default_profile(), settings));
            if let Some(url) = &settings.base_url {
                adapter = adapter.with_base_url(url);
            }
            Arc::new(adapter)
        }
        SourceKind::CoinGecko => {
            let plan = match settings.plan.as_deref() {
                Some(plan) => plan.parse::<CoinGeckoPlan>().map_err(|e| {
                    ConfigurationError::invalid_value("providers.coingecko.plan", e.to_string())
                })?,
                None if key.is_some() => CoinGeckoPlan::Pro,
                None => CoinGeckoPlan::Demo,
            };
            if plan == CoinGeckoPlan::Pro && key.is_none() {
                return Err(ConfigurationError::EnvVarMissing(kind.api_key_env().to_string()));
            }
            let mut adapter = CoinGeckoAdapter::new(required_key(), plan)
                .with_rate_profile(tuned(plan.default_profile(), settings));
            if let Some(url) = &settings.base_url {
                adapter = adapter.with_base_url(url);
            }
            Arc::new(adapter)
        }
        SourceKind::DefiLlama => {
            let mut adapter = DefiLlamaAdapter::new(key.clone())
                .with_rate_profile(tuned(DefiLlamaAdapter::default_profile(), settings));
            if let Some(url) = &settings.base_url {
                adapter = adapter.with_base_url(url);
            }
            Arc::new(adapter)
        }
        SourceKind::Velo => {
            let mut adapter = VeloAdapter::new(required_key())
                .with_rate_profile(tuned(VeloAdapter::default_profile(), settings));
            if let Some(url) = &settings.base_url {
                adapter = adapter.with_base_url(url);
            }
            Arc::new(adapter)
        }
        SourceKind::AlphaVantage => {
            let mut adapter = AlphaVantageAdapter::new(required_key())
                .with_rate_profile(tuned(AlphaVantageAdapter::default_profile(), settings));
            if let Some(url) = &settings.base_url {
                adapter = adapter.with_base_url(url);
            }
            Arc::new(adapter)
        }
    };
    Ok(adapter)
}

fn tuned(profile: RateProfile, settings: &ProviderSettings) -> RateProfile {
    let profile = profile.apply_overrides(
        settings.requests_per_sec,
        settings.concurrency,
        settings.max_attempts,
        settings.timeout(),
    );
    match settings.daily_quota {
        Some(n) => profile.with_quota(WindowQuota::per_day(n)),
        None => profile,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn with_key(key: &str) -> ProviderSettings {
        ProviderSettings {
            api_key: Some(key.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_source_kind_parsing() {
        assert_eq!("Velo".parse::<SourceKind>().unwrap(), SourceKind::Velo);
        assert_eq!("alpha-vantage".parse::<SourceKind>().unwrap(), SourceKind::AlphaVantage);
        assert_eq!("defi_llama".parse::<SourceKind>().unwrap(), SourceKind::DefiLlama);
        assert!("glassnode".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_run_order() {
        let names: Vec<&str> = SourceKind::RUN_ORDER.iter().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["alphavantage", "coingecko", "artemis", "defillama", "velo"]);
    }

    #[test]
    fn test_overrides_reach_the_profile() {
        let settings = ProviderSettings {
            concurrency: Some(2),
            requests_per_sec: Some(1.5),
            max_attempts: Some(5),
            timeout_secs: Some(10),
            ..with_key("k")
        };
        let adapter = build_adapter(SourceKind::Artemis, &settings).unwrap();
        let profile = adapter.rate_profile();
        assert_eq!(profile.concurrency, 2);
        assert_eq!(profile.requests_per_sec, 1.5);
        assert_eq!(profile.max_attempts, 5);
        assert_eq!(profile.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_coingecko_plan_follows_key() {
        let pro = build_adapter(SourceKind::CoinGecko, &with_key("k")).unwrap();
        assert_eq!(pro.rate_profile().requests_per_sec, 8.0);

        let settings = ProviderSettings {
            plan: Some("demo".into()),
            ..with_key("k")
        };
        let demo = build_adapter(SourceKind::CoinGecko, &settings).unwrap();
        assert_eq!(demo.rate_profile().concurrency, 1);
    }

    #[test]
    fn test_daily_quota_override() {
        let settings = ProviderSettings {
            daily_quota: Some(500),
            ..with_key("k")
        };
        let adapter = build_adapter(SourceKind::AlphaVantage, &settings).unwrap();
        assert_eq!(adapter.rate_profile().quota, Some(WindowQuota::per_day(500)));
    }
}
