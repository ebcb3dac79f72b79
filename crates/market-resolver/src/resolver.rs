use std::sync::Arc;
use std::time::Duration;

use analysis_core::{
    CoreError, Financials, HistoricalSeries, IndexSnapshot, MarketRecord, Provenance, Symbol,
};
use chrono::{DateTime, Utc};
use fallback_synthesizer::FallbackSynthesizer;
use futures_util::future::{BoxFuture, FutureExt};
use provider_gateway::{ProviderGateway, ProviderResult, QuotePayload};

use crate::cache::{MarketCache, TtlCache};
use crate::single_flight::SingleFlight;

/// Longest history a caller may ask for in one call.
pub const MAX_SERIES_DAYS: usize = 5_000;

/// Two years of quarters, enough for TTM growth.
const FINANCIAL_QUARTERS: u32 = 8;

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Lifetime of records resolved from a live provider.
    pub live_ttl: Duration,
    /// Lifetime of synthetic records; short so recovery is picked up quickly.
    pub synthetic_ttl: Duration,
    /// Lifetime of live historical series.
    pub series_ttl: Duration,
    /// Lifetime of quarterly statements.
    pub financials_ttl: Duration,
    pub max_entries: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            live_ttl: Duration::from_secs(60),
            synthetic_ttl: Duration::from_secs(15),
            series_ttl: Duration::from_secs(300),
            financials_ttl: Duration::from_secs(6 * 3600),
            max_entries: 1024,
        }
    }
}

/// Resolves symbols to complete market records.
///
/// Lookup order is cache, then providers (one flight per symbol), then the
/// fallback synthesizer. Provider failures never reach the caller.
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<ResolverInner>,
}

struct ResolverInner {
    gateway: ProviderGateway,
    synthesizer: FallbackSynthesizer,
    config: ResolverConfig,
    /// Live records for this symbol supply every other record's index.
    index_symbol: Option<Symbol>,
    records: MarketCache,
    series: TtlCache<HistoricalSeries>,
    financials: TtlCache<Vec<Financials>>,
    record_flights: SingleFlight<MarketRecord>,
    series_flights: SingleFlight<HistoricalSeries>,
    financial_flights: SingleFlight<Vec<Financials>>,
}

impl Resolver {
    pub fn new(
        gateway: ProviderGateway,
        synthesizer: FallbackSynthesizer,
        config: ResolverConfig,
    ) -> Self {
        let index_symbol = match Symbol::parse(synthesizer.index_symbol()) {
            Ok(symbol) => Some(symbol),
            Err(e) => {
                tracing::warn!("Index symbol unusable ({}); index will be synthetic", e);
                None
            }
        };
        let records = MarketCache::new(config.live_ttl, config.max_entries);
        let series = TtlCache::new(config.series_ttl, config.max_entries);
        let financials = TtlCache::new(config.financials_ttl, config.max_entries);
        Self {
            inner: Arc::new(ResolverInner {
                gateway,
                synthesizer,
                config,
                index_symbol,
                records,
                series,
                financials,
                record_flights: SingleFlight::new(),
                series_flights: SingleFlight::new(),
                financial_flights: SingleFlight::new(),
            }),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &MarketCache {
        &self.inner.records
    }

    /// Resolve `symbol` to a fully populated record. Only a malformed symbol
    /// is an error.
    pub async fn resolve(&self, symbol: &str) -> Result<MarketRecord, CoreError> {
        let symbol = Symbol::parse(symbol)?;
        Ok(self.resolve_symbol(&symbol).await)
    }

    pub async fn resolve_symbol(&self, symbol: &Symbol) -> MarketRecord {
        self.inner.resolve_record(symbol.clone()).await
    }

    /// Daily history of up to `days` bars for `symbol`, synthesized when no
    /// provider can supply it.
    pub async fn resolve_series(
        &self,
        symbol: &str,
        days: usize,
    ) -> Result<HistoricalSeries, CoreError> {
        let symbol = Symbol::parse(symbol)?;
        if days == 0 || days > MAX_SERIES_DAYS {
            return Err(CoreError::InvalidInput(format!(
                "days must be between 1 and {}, got {}",
                MAX_SERIES_DAYS, days
            )));
        }

        let key = format!("{}:{}", symbol, days);
        if let Some(series) = self.inner.series.get(&key) {
            tracing::debug!("Series cache hit for {}", key);
            return Ok(series.with_provenance(Provenance::Cached));
        }

        let inner = Arc::clone(&self.inner);
        let owned_symbol = symbol.clone();
        let owned_key = key.clone();
        let flight = self.inner.series_flights.run(&key, async move {
            inner.fetch_series(&owned_symbol, &owned_key, days).await
        });

        match flight.await {
            Ok(series) => Ok(series),
            Err(e) => {
                tracing::error!("{}; serving synthetic series for {}", e, symbol);
                Ok(self.inner.synthesizer.synthesize_series(&symbol, days, Utc::now()))
            }
        }
    }

    /// Quarterly statements for `symbol`, newest first. Empty when no
    /// provider has them; nothing is synthesized.
    pub async fn resolve_financials(&self, symbol: &str) -> Result<Vec<Financials>, CoreError> {
        let symbol = Symbol::parse(symbol)?;
        if let Some(statements) = self.inner.financials.get(symbol.as_str()) {
            tracing::debug!("Financials cache hit for {}", symbol);
            return Ok(statements);
        }

        let inner = Arc::clone(&self.inner);
        let owned = symbol.clone();
        let flight = self
            .inner
            .financial_flights
            .run(symbol.as_str(), async move { inner.fetch_financials(&owned).await });

        match flight.await {
            Ok(statements) => Ok(statements),
            Err(e) => {
                tracing::error!("{}; no financials for {}", e, symbol);
                Ok(Vec::new())
            }
        }
    }
}

impl ResolverInner {
    /// Cache, then one flight per symbol. Boxed because completing a record
    /// can resolve the index symbol through this same path.
    fn resolve_record(self: &Arc<Self>, symbol: Symbol) -> BoxFuture<'static, MarketRecord> {
        let inner = Arc::clone(self);
        async move {
            if let Some(record) = inner.records.get(&symbol) {
                tracing::debug!("Cache hit for {}", symbol);
                return record.with_provenance(Provenance::Cached);
            }

            let worker = Arc::clone(&inner);
            let owned = symbol.clone();
            let flight = inner
                .record_flights
                .run(symbol.as_str(), async move { worker.fetch_record(&owned).await });

            match flight.await {
                Ok(record) => record,
                Err(e) => {
                    tracing::error!("{}; serving synthetic data for {}", e, symbol);
                    inner.synthesized(&symbol, Utc::now())
                }
            }
        }
        .boxed()
    }

    async fn fetch_record(self: &Arc<Self>, symbol: &Symbol) -> MarketRecord {
        // A flight that closed between our cache miss and joining may have
        // already stored a fresh record
        if let Some(record) = self.records.get(symbol) {
            return record.with_provenance(Provenance::Cached);
        }

        let now = Utc::now();
        match self.gateway.fetch(symbol).await {
            ProviderResult::Success(payload) => {
                tracing::info!("Resolved {} from {}", symbol, payload.provider);
                let (market_cap, index) = tokio::join!(
                    self.live_market_cap(symbol, &payload),
                    self.live_index(symbol, &payload),
                );
                let record = self.normalize(symbol, payload, market_cap, index, now);
                self.records.put(record.clone(), self.config.live_ttl);
                record
            }
            ProviderResult::Failure { reason, .. } => {
                tracing::warn!("Providers failed for {}: {}; synthesizing", symbol, reason);
                let record = self.synthesized(symbol, now);
                self.records.put(record.clone(), self.config.synthetic_ttl);
                record
            }
        }
    }

    /// Synthetic record stamped with the time it was served rather than its
    /// bucket start.
    fn synthesized(&self, symbol: &Symbol, now: DateTime<Utc>) -> MarketRecord {
        MarketRecord {
            resolved_at: now,
            ..self.synthesizer.synthesize(symbol, now)
        }
    }

    /// Provider figure, then reference data, then the last live record
    /// rescaled to the current price.
    async fn live_market_cap(&self, symbol: &Symbol, payload: &QuotePayload) -> Option<f64> {
        if payload.market_cap.is_some() {
            return payload.market_cap;
        }
        match self.gateway.fetch_market_cap(symbol).await {
            ProviderResult::Success(cap) => Some(cap),
            ProviderResult::Failure { reason, .. } => {
                tracing::debug!("No market cap for {}: {}", symbol, reason);
                self.cached_market_cap(symbol, payload.price)
            }
        }
    }

    /// Index snapshot taken from the index symbol's own live record. `None`
    /// when that record is synthetic or `symbol` is the index itself.
    async fn live_index(
        self: &Arc<Self>,
        symbol: &Symbol,
        payload: &QuotePayload,
    ) -> Option<IndexSnapshot> {
        if payload.index.is_some() {
            return payload.index.clone();
        }
        let index_symbol = self.index_symbol.as_ref().filter(|s| *s != symbol)?;

        let record = match self.records.get(index_symbol) {
            Some(stored) => stored,
            None => {
                let resolved = self.resolve_record(index_symbol.clone()).await;
                // A cache answer hides the stored provenance
                if resolved.provenance == Provenance::Cached {
                    self.records.get(index_symbol)?
                } else {
                    resolved
                }
            }
        };

        (record.provenance == Provenance::Live).then(|| IndexSnapshot {
            symbol: index_symbol.to_string(),
            value: record.price,
            change_percent: record.change_percent,
        })
    }

    async fn fetch_series(&self, symbol: &Symbol, key: &str, days: usize) -> HistoricalSeries {
        if let Some(series) = self.series.get(key) {
            return series.with_provenance(Provenance::Cached);
        }

        let now = Utc::now();
        let live = match self.gateway.fetch_series(symbol, days as u32).await {
            ProviderResult::Success(bars) => {
                let series = HistoricalSeries::daily(symbol.clone(), bars, Provenance::Live);
                (!series.is_empty()).then_some(series)
            }
            ProviderResult::Failure { reason, .. } => {
                tracing::warn!("No history for {}: {}; synthesizing", symbol, reason);
                None
            }
        };

        match live {
            Some(series) => {
                tracing::info!("Resolved {} bars for {}", series.len(), symbol);
                self.series.put(key, series.clone(), Some(self.config.series_ttl));
                series
            }
            None => {
                let series = self.synthesizer.synthesize_series(symbol, days, now);
                self.series.put(key, series.clone(), Some(self.config.synthetic_ttl));
                series
            }
        }
    }

    async fn fetch_financials(&self, symbol: &Symbol) -> Vec<Financials> {
        if let Some(statements) = self.financials.get(symbol.as_str()) {
            return statements;
        }

        match self.gateway.fetch_financials(symbol, FINANCIAL_QUARTERS).await {
            ProviderResult::Success(statements) => {
                tracing::info!(
                    "Resolved {} quarters of financials for {}",
                    statements.len(),
                    symbol
                );
                self.financials.put(
                    symbol.as_str(),
                    statements.clone(),
                    Some(self.config.financials_ttl),
                );
                statements
            }
            ProviderResult::Failure { reason, .. } => {
                tracing::warn!("No financials for {}: {}", symbol, reason);
                self.financials
                    .put(symbol.as_str(), Vec::new(), Some(self.config.synthetic_ttl));
                Vec::new()
            }
        }
    }

    /// Fill every field the provider left out so the record is complete.
    fn normalize(
        &self,
        symbol: &Symbol,
        payload: QuotePayload,
        market_cap: Option<f64>,
        index: Option<IndexSnapshot>,
        now: DateTime<Utc>,
    ) -> MarketRecord {
        let price = payload.price;
        let synthetic = || self.synthesizer.synthesize(symbol, now);

        let (change, change_percent) = match (
            payload.change,
            payload.change_percent,
            payload.previous_close,
        ) {
            (Some(change), Some(percent), _) => (change, percent),
            (_, _, Some(previous)) => {
                let change = price - previous;
                (change, change / previous * 100.0)
            }
            (Some(change), None, None) => (change, percent_from_change(price, change)),
            (None, Some(percent), None) => (change_from_percent(price, percent), percent),
            (None, None, None) => {
                let percent = synthetic().change_percent;
                (change_from_percent(price, percent), percent)
            }
        };

        let day_high = payload.day_high.unwrap_or(price).max(price);
        let day_low = payload.day_low.unwrap_or(price).min(price);

        let market_cap = market_cap.unwrap_or_else(|| synthetic().market_cap);

        let index = match index {
            Some(index) => index,
            None if self.index_symbol.as_ref() == Some(symbol) => IndexSnapshot {
                symbol: symbol.to_string(),
                value: price,
                change_percent,
            },
            None => self.synthesizer.synthesize_index(now),
        };

        MarketRecord {
            symbol: symbol.clone(),
            price,
            change,
            change_percent,
            day_high,
            day_low,
            volume: payload.volume,
            market_cap,
            index,
            resolved_at: now,
            provenance: Provenance::Live,
        }
    }

    /// Market cap from the last live record for `symbol`, rescaled to the
    /// current price.
    fn cached_market_cap(&self, symbol: &Symbol, price: f64) -> Option<f64> {
        self.records
            .get_stale(symbol)
            .filter(|r| r.provenance != Provenance::Synthetic && r.price > 0.0)
            .map(|r| r.market_cap * price / r.price)
    }
}

fn percent_from_change(price: f64, change: f64) -> f64 {
    let previous = price - change;
    if previous > 0.0 {
        change / previous * 100.0
    } else {
        0.0
    }
}

fn change_from_percent(price: f64, percent: f64) -> f64 {
    if percent > -100.0 {
        price - price / (1.0 + percent / 100.0)
    } else {
        0.0
    }
}
