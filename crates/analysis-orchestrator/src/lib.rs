//! Single entry point over resolution and the three analytics engines.

pub mod config;

use std::sync::Arc;

use analysis_core::{
    CoreError, Financials, FundamentalInputs, HistoricalSeries, IndicatorSet, IndicatorWindows,
    MarketRecord, PolaritySource, ScoreCard, SentimentScore, Symbol,
};
use chrono::{DateTime, Utc};
use fallback_synthesizer::FallbackSynthesizer;
use fundamental_analysis::{FromFinancials, FundamentalScoringEngine, ScoringConfig};
use market_resolver::Resolver;
use provider_gateway::ProviderGateway;
use sentiment_analysis::{momentum_from_record, LexiconPolarity, SentimentAggregator};
use serde::Serialize;
use technical_analysis::TechnicalAnalysisEngine;

pub use config::{EngineConfig, DEFAULT_HISTORY_DAYS};

/// Everything the engine knows about one symbol at one moment.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolReport {
    pub symbol: Symbol,
    pub record: MarketRecord,
    pub indicators: IndicatorSet,
    pub fundamentals: ScoreCard,
    pub sentiment: SentimentScore,
    pub generated_at: DateTime<Utc>,
}

pub struct AnalysisOrchestrator {
    resolver: Resolver,
    technical: TechnicalAnalysisEngine,
    fundamental: FundamentalScoringEngine,
    sentiment: SentimentAggregator,
    polarity_source: Option<Arc<dyn PolaritySource>>,
    windows: IndicatorWindows,
    history_days: usize,
}

impl AnalysisOrchestrator {
    /// Default engines around `resolver`, with the lexicon as polarity source.
    pub fn new(resolver: Resolver) -> Self {
        Self {
            resolver,
            technical: TechnicalAnalysisEngine::new(),
            fundamental: FundamentalScoringEngine::default(),
            sentiment: SentimentAggregator::default(),
            polarity_source: Some(Arc::new(LexiconPolarity::new())),
            windows: IndicatorWindows::default(),
            history_days: DEFAULT_HISTORY_DAYS,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let gateway = ProviderGateway::new(config.build_adapters(), config.gateway.clone());
        tracing::info!("Market providers: {:?}", gateway.provider_names());
        let resolver = Resolver::new(
            gateway,
            FallbackSynthesizer::new(config.synthesizer.clone()),
            config.resolver.clone(),
        );

        Self::new(resolver)
            .with_scoring(config.scoring.clone())
            .with_history_days(config.history_days)
    }

    pub fn with_polarity_source(mut self, source: Option<Arc<dyn PolaritySource>>) -> Self {
        self.polarity_source = source;
        self
    }

    pub fn with_windows(mut self, windows: IndicatorWindows) -> Self {
        self.windows = windows;
        self
    }

    pub fn with_scoring(mut self, config: ScoringConfig) -> Self {
        self.fundamental = FundamentalScoringEngine::new(config);
        self
    }

    pub fn with_history_days(mut self, days: usize) -> Self {
        self.history_days = days;
        self
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub async fn resolve(&self, symbol: &str) -> Result<MarketRecord, CoreError> {
        self.resolver.resolve(symbol).await
    }

    pub async fn resolve_series(
        &self,
        symbol: &str,
        days: usize,
    ) -> Result<HistoricalSeries, CoreError> {
        self.resolver.resolve_series(symbol, days).await
    }

    /// Quarterly statements, newest first; empty when unavailable.
    pub async fn resolve_financials(&self, symbol: &str) -> Result<Vec<Financials>, CoreError> {
        self.resolver.resolve_financials(symbol).await
    }

    pub async fn compute(
        &self,
        series: &HistoricalSeries,
        windows: &IndicatorWindows,
    ) -> Result<IndicatorSet, CoreError> {
        self.technical.compute(series, windows)
    }

    pub async fn score(&self, inputs: &FundamentalInputs) -> Result<ScoreCard, CoreError> {
        self.fundamental.score(inputs)
    }

    pub async fn aggregate(
        &self,
        symbol: &Symbol,
        momentum: f64,
        polarity: Option<f64>,
    ) -> Result<SentimentScore, CoreError> {
        self.sentiment.aggregate(symbol, momentum, polarity)
    }

    /// Full report from market data alone.
    pub async fn analyze(&self, symbol: &str) -> Result<SymbolReport, CoreError> {
        self.analyze_with(symbol, None, &[]).await
    }

    /// Full report, optionally scoring supplied fundamentals and reading
    /// polarity from `headlines`. Without `fundamentals`, inputs are derived
    /// from the provider's quarterly statements. A missing price is taken
    /// from the resolved record.
    pub async fn analyze_with(
        &self,
        symbol: &str,
        fundamentals: Option<FundamentalInputs>,
        headlines: &[String],
    ) -> Result<SymbolReport, CoreError> {
        let symbol = Symbol::parse(symbol)?;
        tracing::info!(
            "Starting analysis for {} ({} days, {} headlines)",
            symbol,
            self.history_days,
            headlines.len()
        );

        let statements = async {
            if fundamentals.is_some() {
                return Ok(Vec::new());
            }
            self.resolver.resolve_financials(symbol.as_str()).await
        };
        let (record, series, statements, polarity) = tokio::join!(
            self.resolver.resolve_symbol(&symbol),
            self.resolver.resolve_series(symbol.as_str(), self.history_days),
            statements,
            self.polarity(&symbol, headlines),
        );
        let series = series?;

        let indicators = self.compute(&series, &self.windows).await?;

        let inputs = match fundamentals {
            Some(mut inputs) => {
                inputs.symbol = symbol.to_string();
                inputs.price = inputs.price.or(Some(record.price));
                inputs
            }
            None => FundamentalInputs::from_financials(
                symbol.as_str(),
                &statements?,
                Some(record.price),
            ),
        };
        let fundamentals = self.score(&inputs).await?;

        let sentiment = self
            .aggregate(&symbol, momentum_from_record(&record), polarity)
            .await?;

        tracing::info!(
            "Analysis for {}: {} record, signal {:?}, quality {:.1}, sentiment {:.2}",
            symbol,
            record.provenance,
            indicators.summary.signal,
            fundamentals.quality_score,
            sentiment.score
        );

        Ok(SymbolReport {
            symbol,
            record,
            indicators,
            fundamentals,
            sentiment,
            generated_at: Utc::now(),
        })
    }

    async fn polarity(&self, symbol: &Symbol, texts: &[String]) -> Option<f64> {
        if texts.is_empty() {
            return None;
        }
        match &self.polarity_source {
            Some(source) => source.polarity(symbol, texts).await,
            None => None,
        }
    }
}
