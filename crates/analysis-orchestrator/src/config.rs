use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use fallback_synthesizer::SynthesizerConfig;
use fundamental_analysis::ScoringConfig;
use market_resolver::{ResolverConfig, MAX_SERIES_DAYS};
use provider_gateway::{
    AlphaVantageAdapter, Backoff, GatewayConfig, PolygonAdapter, ProviderAdapter,
};

/// Bars of history fetched for indicator computation.
pub const DEFAULT_HISTORY_DAYS: usize = 120;

/// Everything the engine reads from the environment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Provider names in priority order.
    pub providers: Vec<String>,
    pub polygon_api_key: Option<String>,
    pub alphavantage_api_key: Option<String>,
    /// Polygon requests per minute.
    pub polygon_rate_limit: usize,
    pub history_days: usize,
    pub gateway: GatewayConfig,
    pub resolver: ResolverConfig,
    pub synthesizer: SynthesizerConfig,
    pub scoring: ScoringConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            providers: vec!["polygon".to_string(), "alphavantage".to_string()],
            polygon_api_key: None,
            alphavantage_api_key: None,
            polygon_rate_limit: 500,
            history_days: DEFAULT_HISTORY_DAYS,
            gateway: GatewayConfig::default(),
            resolver: ResolverConfig::default(),
            synthesizer: SynthesizerConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source; unset variables take their
    /// defaults, unparsable ones are an error naming the variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let providers = lookup("MARKET_PROVIDERS")
            .unwrap_or_else(|| "polygon,alphavantage".to_string())
            .split(',')
            .map(|p| p.trim().to_ascii_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        let backoff = Backoff::new(
            Duration::from_millis(parse_var(&lookup, "MARKET_BACKOFF_BASE_MS", "200")?),
            Duration::from_millis(parse_var(&lookup, "MARKET_BACKOFF_MAX_MS", "3000")?),
        );
        if backoff.base > backoff.max {
            anyhow::bail!(
                "MARKET_BACKOFF_BASE_MS ({:?}) exceeds MARKET_BACKOFF_MAX_MS ({:?})",
                backoff.base,
                backoff.max
            );
        }

        let gateway = GatewayConfig {
            max_providers: parse_var(&lookup, "MARKET_MAX_PROVIDERS", "3")?,
            max_retries: parse_var(&lookup, "MARKET_MAX_RETRIES", "2")?,
            request_timeout: Duration::from_millis(parse_var(
                &lookup,
                "MARKET_PROVIDER_TIMEOUT_MS",
                "4000",
            )?),
            backoff,
        };

        let resolver = ResolverConfig {
            live_ttl: Duration::from_secs(parse_var(&lookup, "MARKET_CACHE_TTL_SECS", "60")?),
            synthetic_ttl: Duration::from_secs(parse_var(
                &lookup,
                "MARKET_SYNTHETIC_TTL_SECS",
                "15",
            )?),
            series_ttl: Duration::from_secs(parse_var(&lookup, "MARKET_SERIES_TTL_SECS", "300")?),
            financials_ttl: Duration::from_secs(parse_var(
                &lookup,
                "MARKET_FINANCIALS_TTL_SECS",
                "21600",
            )?),
            max_entries: parse_var(&lookup, "MARKET_CACHE_MAX_ENTRIES", "1024")?,
        };

        let synthesizer = SynthesizerConfig {
            bucket: Duration::from_secs(parse_var(&lookup, "MARKET_SYNTH_BUCKET_SECS", "3600")?),
            ..Default::default()
        };

        let scoring = ScoringConfig::default()
            .with_neutral_baseline(parse_var(&lookup, "FUNDAMENTAL_NEUTRAL_BASELINE", "50")?);
        scoring
            .validate()
            .context("FUNDAMENTAL_NEUTRAL_BASELINE is out of range")?;

        let history_days: usize = parse_var(&lookup, "MARKET_HISTORY_DAYS", "120")?;
        if history_days == 0 || history_days > MAX_SERIES_DAYS {
            anyhow::bail!(
                "MARKET_HISTORY_DAYS must be between 1 and {}, got {}",
                MAX_SERIES_DAYS,
                history_days
            );
        }

        Ok(Self {
            providers,
            polygon_api_key: api_key(&lookup, "POLYGON_API_KEY"),
            alphavantage_api_key: api_key(&lookup, "ALPHAVANTAGE_API_KEY"),
            polygon_rate_limit: parse_var(&lookup, "POLYGON_RATE_LIMIT", "500")?,
            history_days,
            gateway,
            resolver,
            synthesizer,
            scoring,
        })
    }

    /// Adapters for the configured providers, in priority order. Providers
    /// without an API key are skipped.
    pub fn build_adapters(&self) -> Vec<Arc<dyn ProviderAdapter>> {
        let mut adapters: Vec<Arc<dyn ProviderAdapter>> = Vec::new();
        for name in &self.providers {
            match name.as_str() {
                "polygon" => match &self.polygon_api_key {
                    Some(key) => adapters.push(Arc::new(PolygonAdapter::new(
                        key.clone(),
                        self.polygon_rate_limit,
                    ))),
                    None => tracing::warn!("POLYGON_API_KEY not set, skipping polygon"),
                },
                "alphavantage" => match &self.alphavantage_api_key {
                    Some(key) => adapters.push(Arc::new(AlphaVantageAdapter::new(key.clone()))),
                    None => tracing::warn!("ALPHAVANTAGE_API_KEY not set, skipping alphavantage"),
                },
                other => tracing::warn!("Unknown market provider '{}' ignored", other),
            }
        }

        if adapters.is_empty() {
            tracing::warn!("No market providers configured; all data will be synthetic");
        }
        adapters
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: &str) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = lookup(name).unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: '{}'", name, raw))
}

fn api_key<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}
