use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::normalizer::{parse_flows, parse_series};
use crate::backfill::ChunkStrategy;
use crate::provider::{
    FetchRequest, ParseOutput, ProviderError, ProviderResult, RateProfile, SourceAdapter,
};
use crate::schema::{EntitySpec, FetchTask, ZeroPolicy};
use collector_common::error::ConfigurationError;

const API_BASE_URL: &str = "https://api.llama.fi";
const STABLECOINS_BASE_URL: &str = "https://stablecoins.llama.fi";
const PRO_BASE_URL: &str = "https://pro-api.llama.fi";

/// Endpoint family an entity is requested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlamaScope {
    Fees,
    Revenue,
    Dexs,
    Derivatives,
    Aggregators,
    Tvl,
    ChainTvl,
    Stablecoin,
    Inflows,
}

impl LlamaScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlamaScope::Fees => "fees",
            LlamaScope::Revenue => "revenue",
            LlamaScope::Dexs => "dexs",
            LlamaScope::Derivatives => "derivatives",
            LlamaScope::Aggregators => "aggregators",
            LlamaScope::Tvl => "tvl",
            LlamaScope::ChainTvl => "chain_tvl",
            LlamaScope::Stablecoin => "stablecoin",
            LlamaScope::Inflows => "inflows",
        }
    }

    /// Stored metric name. Inflows emit `INFLOW` and `OUTFLOW`.
    pub fn metric(&self) -> &'static str {
        match self {
            LlamaScope::Fees => "FEES",
            LlamaScope::Revenue => "REVENUE",
            LlamaScope::Dexs => "DEX_VOLUME",
            LlamaScope::Derivatives => "DERIVATIVES_VOLUME",
            LlamaScope::Aggregators => "AGGREGATOR_VOLUME",
            LlamaScope::Tvl => "TVL",
            LlamaScope::ChainTvl => "CHAIN_TVL",
            LlamaScope::Stablecoin => "STABLECOIN_CIRCULATING",
            LlamaScope::Inflows => "INFLOW",
        }
    }
}

impl fmt::Display for LlamaScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlamaScope {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "fees" => LlamaScope::Fees,
            "revenue" => LlamaScope::Revenue,
            "dexs" => LlamaScope::Dexs,
            "derivatives" => LlamaScope::Derivatives,
            "aggregators" => LlamaScope::Aggregators,
            "tvl" => LlamaScope::Tvl,
            "chain_tvl" => LlamaScope::ChainTvl,
            "stablecoin" => LlamaScope::Stablecoin,
            "inflows" => LlamaScope::Inflows,
            other => {
                return Err(ProviderError::Configuration(format!(
                    "unknown DefiLlama scope '{}'",
                    other
                )))
            }
        })
    }
}

pub struct DefiLlamaAdapter {
    api_key: Option<String>,
    api_base: String,
    stablecoins_base: String,
    pro_base: String,
    profile: RateProfile,
}

impl DefiLlamaAdapter {
    /// `api_key` is only needed for the pro `inflows` scope.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            api_base: API_BASE_URL.to_string(),
            stablecoins_base: STABLECOINS_BASE_URL.to_string(),
            pro_base: PRO_BASE_URL.to_string(),
            profile: Self::default_profile(),
        }
    }

    pub fn default_profile() -> RateProfile {
        RateProfile::new(15.0, 10)
            .with_max_attempts(3)
            .with_timeout(Duration::from_secs(60))
    }

    /// Point every endpoint family at one host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base = base_url.into().trim_end_matches('/').to_string();
        self.api_base = base.clone();
        self.stablecoins_base = base.clone();
        self.pro_base = base;
        self
    }

    pub fn with_rate_profile(mut self, profile: RateProfile) -> Self {
        self.profile = profile;
        self
    }

    fn scope(task: &FetchTask) -> ProviderResult<LlamaScope> {
        task.scope
            .as_deref()
            .ok_or_else(|| {
                ProviderError::Configuration(format!(
                    "defillama entities need an endpoint scope: {}",
                    task.entities.join(",")
                ))
            })?
            .parse()
    }

    fn slug(task: &FetchTask) -> ProviderResult<&str> {
        task.entities
            .first()
            .map(String::as_str)
            .ok_or_else(|| ProviderError::Internal("task without entities".into()))
    }
}

impl SourceAdapter for DefiLlamaAdapter {
    fn name(&self) -> &str {
        "defillama"
    }

    fn rate_profile(&self) -> RateProfile {
        self.profile.clone()
    }

    fn validate_entities(&self, entities: &[EntitySpec]) -> Result<(), ConfigurationError> {
        let mut needs_key = false;
        for entity in entities {
            let scope = entity.scope.as_deref().ok_or_else(|| {
                ConfigurationError::invalid_value(
                    "providers.defillama.entities",
                    format!("{} has no endpoint scope", entity.id),
                )
            })?;
            let scope: LlamaScope = scope.parse().map_err(|_| {
                ConfigurationError::invalid_value(
                    "providers.defillama.entities",
                    format!("unknown scope '{}' for {}", scope, entity.id),
                )
            })?;
            needs_key |= scope == LlamaScope::Inflows;
        }
        if needs_key && self.api_key.is_none() {
            return Err(ConfigurationError::EnvVarMissing("DEFILLAMA_API_KEY".into()));
        }
        Ok(())
    }

    fn chunk_strategy(&self, scope: Option<&str>) -> ChunkStrategy {
        match scope.and_then(|s| s.parse::<LlamaScope>().ok()) {
            Some(LlamaScope::Inflows) => ChunkStrategy::CalendarDay,
            _ => ChunkStrategy::Single,
        }
    }

    fn build_request(&self, task: &FetchTask) -> ProviderResult<FetchRequest> {
        let scope = Self::scope(task)?;
        let slug = Self::slug(task)?;
        let api = &self.api_base;

        Ok(match scope {
            LlamaScope::Fees => FetchRequest::get(format!("{}/summary/fees/{}", api, slug)),
            LlamaScope::Revenue => FetchRequest::get(format!("{}/summary/fees/{}", api, slug))
                .with_query("dataType", "dailyRevenue"),
            LlamaScope::Dexs => FetchRequest::get(format!("{}/summary/dexs/{}", api, slug)),
            LlamaScope::Derivatives => {
                FetchRequest::get(format!("{}/summary/derivatives/{}", api, slug))
            }
            LlamaScope::Aggregators => {
                FetchRequest::get(format!("{}/summary/aggregators/{}", api, slug))
            }
            LlamaScope::Tvl => FetchRequest::get(format!("{}/protocol/{}", api, slug)),
            LlamaScope::ChainTvl => {
                FetchRequest::get(format!("{}/v2/historicalChainTvl/{}", api, slug))
            }
            LlamaScope::Stablecoin => {
                FetchRequest::get(format!("{}/stablecoincharts/all", self.stablecoins_base))
                    .with_query("stablecoin", slug)
            }
            LlamaScope::Inflows => {
                let key = self.api_key.as_deref().ok_or_else(|| {
                    ProviderError::Configuration(
                        "DefiLlama inflows require DEFILLAMA_API_KEY".into(),
                    )
                })?;
                FetchRequest::get(format!(
                    "{}/{}/api/inflows/{}/{}",
                    self.pro_base,
                    key,
                    slug,
                    task.window.start().timestamp()
                ))
            }
        })
    }

    fn parse_response(&self, task: &FetchTask, body: &str) -> ProviderResult<ParseOutput> {
        let scope = Self::scope(task)?;
        let slug = Self::slug(task)?;
        match scope {
            LlamaScope::Inflows => parse_flows(body, slug, &task.window),
            _ => parse_series(body, scope, slug, &task.window),
        }
    }

    fn zero_policy(&self, _metric_name: &str) -> ZeroPolicy {
        ZeroPolicy::Drop
    }
}
